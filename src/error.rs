/// Converts a `Result` into an `Option`, logging the error.
///
/// Used wherever a failed read must degrade to "absent" instead of aborting a collection.
pub trait ResultOkLogExt<T, E> {
    /// Logs the error at `warn` level.
    fn ok_log(self) -> Option<T>;

    /// Logs the error at `debug` level. For failures that are routine, like a process
    /// exiting while it is being inspected.
    fn ok_log_debug(self) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!("{err}");
                None
            }
        }
    }

    fn ok_log_debug(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::debug!("{err}");
                None
            }
        }
    }
}
