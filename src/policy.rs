// Access policy for the upload inbox

use crate::s3::S3Operation;

/// Whether an operation may be forwarded to the backend.
///
/// The inbox only accepts uploads: object writes (including multipart
/// parts and completion), listings of the caller's own namespace, and
/// aborting an unfinished multipart upload. Reads, deletes, bucket
/// management and policy/ACL changes are refused.
pub fn is_allowed(operation: S3Operation) -> bool {
    match operation {
        S3Operation::Put | S3Operation::List | S3Operation::Other | S3Operation::AbortMultipart => {
            true
        }
        S3Operation::MakeBucket
        | S3Operation::RemoveBucket
        | S3Operation::Delete
        | S3Operation::Policy
        | S3Operation::Get => false,
    }
}
