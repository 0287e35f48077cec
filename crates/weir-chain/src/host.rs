use weir_core::Invocation;

/// Terminal of the interposition chain: whatever sits beneath the outermost
/// interceptor. The real transport to a host kernel is a property of the
/// embedding, not of this crate, so it is a seam.
pub trait HostInterface: Send + Sync {
    fn call(&self, inv: &Invocation) -> i32;
}

/// Default terminal: every call that falls through the chain is answered
/// with -ENOSYS. A sealed chain serves everything it intends to serve.
pub struct DenyAllHost;

impl HostInterface for DenyAllHost {
    fn call(&self, _inv: &Invocation) -> i32 {
        -libc::ENOSYS
    }
}
