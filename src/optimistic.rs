//! Snapshot, speculative apply, then confirm or revert.

#[derive(Debug, PartialEq, Eq)]
pub enum Commit<T, E> {
    Applied(T),
    RolledBack(E),
}

impl<T, E> Commit<T, E> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Commit::Applied(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Commit::Applied(value) => Ok(value),
            Commit::RolledBack(err) => Err(err),
        }
    }
}

/// Applies `speculate` to `state` right away, then runs `confirm`. On success
/// `settle` reconciles the state with the confirmed value; on failure the
/// state is restored to the snapshot taken before `speculate`.
pub fn commit<S, T, E>(
    state: &mut S,
    speculate: impl FnOnce(&mut S),
    confirm: impl FnOnce() -> Result<T, E>,
    settle: impl FnOnce(&mut S, &T),
) -> Commit<T, E>
where
    S: Clone,
{
    let snapshot = state.clone();
    speculate(state);
    match confirm() {
        Ok(value) => {
            settle(state, &value);
            Commit::Applied(value)
        }
        Err(err) => {
            *state = snapshot;
            Commit::RolledBack(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applied_keeps_speculative_state() {
        let mut enabled = vec![false, true];
        let outcome = commit(
            &mut enabled,
            |state| state[0] = true,
            || Ok::<_, String>("renamed"),
            |_, _| {},
        );
        assert_eq!(outcome, Commit::Applied("renamed"));
        assert_eq!(enabled, vec![true, true]);
    }

    #[test]
    fn failure_restores_snapshot() {
        let mut enabled = vec![false, true];
        let outcome = commit(
            &mut enabled,
            |state| {
                state[0] = true;
                state[1] = false;
            },
            || Err::<(), _>("locked".to_string()),
            |_, _| {},
        );
        assert_eq!(outcome, Commit::RolledBack("locked".to_string()));
        assert_eq!(enabled, vec![false, true]);
    }

    #[test]
    fn settle_sees_confirmed_value() {
        let mut name = String::from("Alpha");
        let outcome = commit(
            &mut name,
            |state| state.insert_str(0, "DISABLED "),
            || Ok::<_, ()>("disabled_Alpha".to_string()),
            |state, confirmed| *state = confirmed.clone(),
        );
        assert!(outcome.is_applied());
        assert_eq!(name, "disabled_Alpha");
    }
}
