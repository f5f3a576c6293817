use std::collections::HashMap;

use super::types::JobStatus;

impl JobStatus {
    /// Finished jobs are never restarted, so these states are final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::FinishedWithError | JobStatus::FinishedSuccessfully
        )
    }
}

/// Whether an observer may see `dst` after having seen `src`.
pub fn valid_status_transition(src: &JobStatus, dst: &JobStatus) -> bool {
    if src == dst || *dst == JobStatus::Undefined {
        return !src.is_terminal() || src == dst;
    }

    let status_transition_map: HashMap<JobStatus, Vec<JobStatus>> = {
        let mut map = HashMap::new();
        map.insert(
            JobStatus::NotStarted,
            vec![
                JobStatus::Started,
                JobStatus::FinishedWithError,
                JobStatus::FinishedSuccessfully,
            ],
        );
        map.insert(
            JobStatus::Started,
            vec![JobStatus::FinishedWithError, JobStatus::FinishedSuccessfully],
        );
        map.insert(
            JobStatus::Undefined,
            vec![
                JobStatus::NotStarted,
                JobStatus::Started,
                JobStatus::FinishedWithError,
                JobStatus::FinishedSuccessfully,
            ],
        );
        map.insert(JobStatus::FinishedWithError, vec![]);
        map.insert(JobStatus::FinishedSuccessfully, vec![]);
        map
    };

    status_transition_map
        .get(src)
        .is_some_and(|valid| valid.contains(dst))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_are_valid() {
        assert!(valid_status_transition(&JobStatus::NotStarted, &JobStatus::Started));
        assert!(valid_status_transition(
            &JobStatus::Started,
            &JobStatus::FinishedSuccessfully
        ));
        assert!(valid_status_transition(
            &JobStatus::NotStarted,
            &JobStatus::FinishedWithError
        ));
    }

    #[test]
    fn terminal_states_do_not_restart() {
        assert!(!valid_status_transition(
            &JobStatus::FinishedSuccessfully,
            &JobStatus::Started
        ));
        assert!(!valid_status_transition(
            &JobStatus::FinishedWithError,
            &JobStatus::Undefined
        ));
        assert!(valid_status_transition(
            &JobStatus::FinishedWithError,
            &JobStatus::FinishedWithError
        ));
    }

    #[test]
    fn undefined_is_reachable_and_recoverable() {
        assert!(valid_status_transition(&JobStatus::Started, &JobStatus::Undefined));
        assert!(valid_status_transition(&JobStatus::Undefined, &JobStatus::Started));
        assert!(!valid_status_transition(&JobStatus::Started, &JobStatus::NotStarted));
    }

    #[test]
    fn only_finished_states_are_terminal() {
        assert!(JobStatus::FinishedSuccessfully.is_terminal());
        assert!(JobStatus::FinishedWithError.is_terminal());
        assert!(!JobStatus::Started.is_terminal());
        assert!(!JobStatus::Undefined.is_terminal());
    }
}
