use sea_orm::entity::prelude::*;

/// Lifecycle state of a task.
///
/// ```text
/// pending -> running -> completed -> reported
///               |           |
///               |           +-> failed_processing
///               +-> failed_analysis
///
/// running | completed | failed_analysis | failed_processing -> recovered
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    Hash,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
    strum::VariantArray,
    serde::Serialize,
    serde::Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Status {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "reported")]
    Reported,
    #[sea_orm(string_value = "recovered")]
    Recovered,
    #[sea_orm(string_value = "failed_analysis")]
    FailedAnalysis,
    #[sea_orm(string_value = "failed_processing")]
    FailedProcessing,
}

impl Status {
    /// Check if the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: Status) -> bool {
        use Status::*;

        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Completed)
                | (Running, FailedAnalysis)
                | (Completed, Reported)
                | (Completed, FailedProcessing)
                | (Running | Completed | FailedAnalysis | FailedProcessing, Recovered)
        )
    }

    /// A task in this state has finished its analysis run (successfully or not).
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            Status::Completed | Status::Reported | Status::FailedAnalysis | Status::FailedProcessing
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;
    use strum::VariantArray;

    #[test]
    fn names() {
        assert_eq!(Status::FailedAnalysis.to_string(), "failed_analysis");
        assert_eq!("recovered".parse::<Status>(), Ok(Status::Recovered));
    }

    #[rstest]
    #[case(Status::Pending, Status::Running, true)]
    #[case(Status::Pending, Status::Reported, false)]
    #[case(Status::Pending, Status::Recovered, false)]
    #[case(Status::Running, Status::Completed, true)]
    #[case(Status::Running, Status::FailedAnalysis, true)]
    #[case(Status::Running, Status::Reported, false)]
    #[case(Status::Completed, Status::Reported, true)]
    #[case(Status::Completed, Status::FailedProcessing, true)]
    #[case(Status::Completed, Status::Running, false)]
    #[case(Status::FailedAnalysis, Status::Recovered, true)]
    #[case(Status::FailedProcessing, Status::Recovered, true)]
    #[case(Status::Reported, Status::Recovered, false)]
    #[case(Status::Recovered, Status::Pending, false)]
    fn transitions(#[case] from: Status, #[case] to: Status, #[case] expected: bool) {
        assert_eq!(from.can_transition_to(to), expected);
    }

    #[test]
    fn no_self_transitions() {
        for status in Status::VARIANTS {
            assert!(!status.can_transition_to(*status), "{status}");
        }
    }
}
