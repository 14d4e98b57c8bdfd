use std::os::fd::OwnedFd;

/// Wake-up handle of a poller.
///
/// Writing to the wrapped descriptor interrupts a blocking wait so the
/// reactor thread can notice shutdown requests.
pub(crate) struct Waker(pub(crate) OwnedFd);
