//! Mapping of SDK errors onto urio error kinds

use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use urio_core::{Error, Operation, Target};

const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NoSuchBucket", "NotFound"];

const AUTH_CODES: &[&str] = &[
    "AccessDenied",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "ExpiredToken",
    "InvalidToken",
];

/// Classify an SDK failure for `operation` on `path`
pub(crate) fn classify<E>(
    target: &Target,
    operation: Operation,
    path: &str,
    err: SdkError<E, HttpResponse>,
) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::TimeoutError(_) => target.timeout(operation, DisplayErrorContext(&err)),
        SdkError::DispatchFailure(failure) if failure.is_timeout() => {
            target.timeout(operation, DisplayErrorContext(&err))
        }
        SdkError::DispatchFailure(_) => target.connection(operation, DisplayErrorContext(&err)),
        SdkError::ServiceError(ctx) => {
            let code = ctx.err().code().unwrap_or_default();
            let status = ctx.raw().status().as_u16();
            if status == 404 || NOT_FOUND_CODES.contains(&code) {
                target.not_found(operation, path)
            } else if status == 401 || status == 403 || AUTH_CODES.contains(&code) {
                target.connection(operation, DisplayErrorContext(&err))
            } else {
                target.transfer(operation, DisplayErrorContext(&err))
            }
        }
        _ => target.transfer(operation, DisplayErrorContext(&err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::get_object::GetObjectError;
    use aws_smithy_types::body::SdkBody;

    fn target() -> Target {
        Target::new("s3", "AKIA:***@bucket")
    }

    fn service_error(status: u16, code: &str) -> SdkError<GetObjectError, HttpResponse> {
        let err = GetObjectError::generic(ErrorMetadata::builder().code(code).build());
        let raw = HttpResponse::new(status.try_into().unwrap(), SdkBody::empty());
        SdkError::service_error(err, raw)
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let err = classify(&target(), Operation::Open, "/k", service_error(404, "NoSuchKey"));
        assert!(matches!(err, Error::NotFound { ref path, .. } if path == "/k"));
    }

    #[test]
    fn test_access_denied_is_connection() {
        let err = classify(&target(), Operation::Open, "/k", service_error(403, "AccessDenied"));
        assert!(matches!(err, Error::Connection { .. }));
    }

    #[test]
    fn test_server_error_is_transfer() {
        let err = classify(&target(), Operation::Write, "/k", service_error(500, "InternalError"));
        assert!(matches!(err, Error::Transfer { operation: Operation::Write, .. }));
    }

    #[test]
    fn test_timeout() {
        let sdk: SdkError<GetObjectError, HttpResponse> = SdkError::timeout_error("deadline");
        let err = classify(&target(), Operation::Read, "/k", sdk);
        assert!(matches!(err, Error::Timeout { .. }));
    }
}
