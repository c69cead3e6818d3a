use std::io;

/// Hook consulted before a manager-wide refresh
///
/// `Ok(false)` vetoes the refresh. An error also vetoes it and is reported.
pub trait RefreshListener: Send + Sync {
    fn refresh(&self) -> io::Result<bool>;
}

impl<F> RefreshListener for F
where
    F: Fn() -> io::Result<bool> + Send + Sync,
{
    fn refresh(&self) -> io::Result<bool> {
        self()
    }
}
