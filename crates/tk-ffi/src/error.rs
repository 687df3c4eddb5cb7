use std::cell::Cell;
use std::ffi::CString;
use std::fmt;
use std::thread;

use tk_ops::WORKSPACE_UNAVAILABLE;

use crate::types::TkStatus;

thread_local! {
    /// Message of the last failed call on this thread, until `tk_last_error`
    /// takes it.
    static LAST_ERROR: Cell<Option<CString>> = const { Cell::new(None) };
}

fn record(message: impl fmt::Display) {
    // C strings end at the first NUL
    let text = message.to_string().replace('\0', " ");
    LAST_ERROR.set(CString::new(text).ok());
}

pub(crate) fn take_message() -> Option<CString> {
    LAST_ERROR.take()
}

/// Translate an operator result into a status code, recording the message
/// of a failure.
pub(crate) fn report(result: tk_ops::Result<()>) -> TkStatus {
    match result {
        Ok(()) => TkStatus::Success,
        Err(e) => {
            log::debug!("ffi call failed: {e}");
            record(&e);
            e.status().into()
        }
    }
}

pub(crate) fn report_panic() -> TkStatus {
    record("internal panic");
    TkStatus::InternalError
}

/// Size queries report failure in-band as [`WORKSPACE_UNAVAILABLE`].
pub(crate) fn report_size(outcome: thread::Result<tk_ops::Result<usize>>) -> usize {
    match outcome {
        Ok(Ok(size)) => size,
        Ok(Err(e)) => {
            log::debug!("ffi size query failed: {e}");
            record(&e);
            WORKSPACE_UNAVAILABLE
        }
        Err(_) => {
            record("internal panic");
            WORKSPACE_UNAVAILABLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tk_ops::Error;

    #[test]
    fn test_report_records_message_once() {
        assert_eq!(report(Ok(())), TkStatus::Success);
        assert!(take_message().is_none());

        let status = report(Err(Error::NotImplemented("no solver".into())));
        assert_eq!(status, TkStatus::NotImplemented);
        let msg = take_message().unwrap();
        assert_eq!(msg.to_str().unwrap(), "not implemented: no solver");
        assert!(take_message().is_none());
    }

    #[test]
    fn test_interior_nul_is_kept_readable() {
        report(Err(Error::BadParam("a\0b".into())));
        assert_eq!(take_message().unwrap().to_str().unwrap(), "bad parameter: a b");
    }

    #[test]
    fn test_size_query_failures() {
        assert_eq!(report_size(Ok(Ok(64))), 64);
        assert_eq!(
            report_size(Ok(Err(Error::BadParam("bad".into())))),
            WORKSPACE_UNAVAILABLE
        );
        assert!(take_message().is_some());
        assert_eq!(report_size(Err(Box::new("boom"))), WORKSPACE_UNAVAILABLE);
        assert_eq!(take_message().unwrap().to_str().unwrap(), "internal panic");
    }
}
