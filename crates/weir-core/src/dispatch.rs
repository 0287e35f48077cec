use crate::domain::Invocation;
use crate::runtime::Runtime;
use crate::table::HandlerEntry;
use weir_contracts::DISPATCH_UNRESOLVED;

/// The single entry point the runtime invokes when a registered syscall
/// fires.
///
/// An absent entry signals a dispatch request the handler table cannot
/// resolve. That must never happen while the table and the runtime agree on
/// registrations, so it is logged and answered with the fixed sentinel
/// rather than taken as fatal: one missing handler must not take down the
/// interception chain.
///
/// The dispatcher interprets nothing: which slots are references and how to
/// stage them is syscall-specific and belongs to the callback.
pub fn dispatch(entry: Option<&HandlerEntry>, rt: &dyn Runtime, inv: &Invocation) -> i32 {
    let Some(entry) = entry else {
        eprintln!(
            "[weir] dispatch: no callback resolved for syscall {} from domain {}",
            inv.nr, inv.caller
        );
        return DISPATCH_UNRESOLVED;
    };
    entry.callback.handle(rt, inv)
}
