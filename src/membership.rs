/// Strategy for resolving how many worker replies one decision expects.
///
/// The count is captured fresh when a decision opens and never re-read while
/// the decision is in flight, so workers joining or leaving mid-decision do
/// not move the goalposts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Pool size fixed at construction time; adopted synchronously when a
    /// decision opens.
    Static(usize),
    /// The worker registry is counted at the start of every decision. The
    /// count is resolved off the event loop and delivered back into it as an
    /// ordinary event, so submissions and replies that arrive in the meantime
    /// are deferred rather than raced.
    Dynamic,
}
