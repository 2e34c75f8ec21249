// FanoutPolicy :: the single fan-out helper REDESIGN FLAGS §2 asks for, replacing the
// source's decorator-stack composition ("apply over all / first / best-inexistent") with one
// policy enum and a per-backing closure.

use crate::resolver::BackingPath;

/// The fan-out policies named in spec.md §4.2's operation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutPolicy {
    /// Touch every selected backing path in root-registry order.
    AllForward,

    /// Touch every selected backing path in reverse root-registry order, so the
    /// root-registry-earliest root is touched last — its state is what a later
    /// getattr/readlink observes (spec.md §4.2's design note).
    AllReverse,

    /// Touch only the first selected backing path.
    FirstOnly,
}

/// Runs `op` over `paths` according to `policy`, returning the last result produced (or the
/// only result, for [`FanoutPolicy::FirstOnly`]). Aborts and propagates the first error
/// encountered without running the rest — spec.md §7's propagation policy.
pub fn fan_out<T>(
    paths: &[BackingPath],
    policy: FanoutPolicy,
    mut op: impl FnMut(&BackingPath) -> Result<T, libc::c_int>,
) -> Result<T, libc::c_int> {
    match policy {
        FanoutPolicy::FirstOnly => op(paths.first().expect("resolve never returns an empty list")),

        FanoutPolicy::AllForward => {
            let mut last = None;
            for backing in paths {
                last = Some(op(backing)?);
            }
            Ok(last.expect("resolve never returns an empty list"))
        }

        FanoutPolicy::AllReverse => {
            let mut last = None;
            for backing in paths.iter().rev() {
                last = Some(op(backing)?);
            }
            Ok(last.expect("resolve never returns an empty list"))
        }
    }
}
