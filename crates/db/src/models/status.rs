//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table. On the wire the
//! variants serialize as upper-case names (`"IN_PROGRESS"`).

use std::fmt;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

/// A status id read from the database that no enum variant maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} status id {id}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub id: StatusId,
}

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $label)] $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Upper-case display name, as stored in the lookup table.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl TryFrom<StatusId> for $name {
            type Error = UnknownStatus;

            fn try_from(id: StatusId) -> Result<Self, Self::Error> {
                $( if id == $val { return Ok($name::$variant); } )+
                Err(UnknownStatus { kind: stringify!($name), id })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_status_enum! {
    /// Lifecycle of a task and of each of its compute items.
    ///
    /// `Superseded` is terminal: the work was discarded because a newer task
    /// arrived for the same key before it started.
    TaskStatus {
        Pending = 1 => "PENDING",
        InProgress = 2 => "IN_PROGRESS",
        Completed = 3 => "COMPLETED",
        Failed = 4 => "FAILED",
        Superseded = 5 => "SUPERSEDED",
    }
}

define_status_enum! {
    /// Lifecycle of one downstream service call.
    ServiceRequestStatus {
        Pending = 1 => "PENDING",
        InProgress = 2 => "IN_PROGRESS",
        Completed = 3 => "COMPLETED",
        Failed = 4 => "FAILED",
    }
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Superseded
        )
    }

    /// Allowed forward transitions. Nothing leaves a terminal state.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        matches!(
            (self, to),
            (
                TaskStatus::Pending,
                TaskStatus::InProgress | TaskStatus::Failed | TaskStatus::Superseded
            ) | (
                TaskStatus::InProgress,
                TaskStatus::Completed | TaskStatus::Failed
            )
        )
    }
}

impl ServiceRequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ServiceRequestStatus::Completed | ServiceRequestStatus::Failed
        )
    }

    /// PENDING -> IN_PROGRESS -> {COMPLETED | FAILED}. A request that never
    /// got dispatched may go straight from PENDING to FAILED (timeout,
    /// recovery).
    pub fn can_transition_to(self, to: ServiceRequestStatus) -> bool {
        matches!(
            (self, to),
            (
                ServiceRequestStatus::Pending,
                ServiceRequestStatus::InProgress | ServiceRequestStatus::Failed
            ) | (
                ServiceRequestStatus::InProgress,
                ServiceRequestStatus::Completed | ServiceRequestStatus::Failed
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_match_seed_order() {
        assert_eq!(TaskStatus::Pending.id(), 1);
        assert_eq!(TaskStatus::Superseded.id(), 5);
        assert_eq!(ServiceRequestStatus::Failed.id(), 4);
    }

    #[test]
    fn try_from_rejects_unknown_ids() {
        assert_eq!(TaskStatus::try_from(2), Ok(TaskStatus::InProgress));
        assert_eq!(
            ServiceRequestStatus::try_from(9),
            Err(UnknownStatus {
                kind: "ServiceRequestStatus",
                id: 9
            })
        );
    }

    #[test]
    fn serializes_as_upper_case_names() {
        assert_eq!(
            serde_json::to_value(TaskStatus::InProgress).unwrap(),
            serde_json::json!("IN_PROGRESS")
        );
        let parsed: TaskStatus = serde_json::from_str("\"SUPERSEDED\"").unwrap();
        assert_eq!(parsed, TaskStatus::Superseded);
    }

    #[test]
    fn terminal_task_states_never_transition() {
        for from in [
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Superseded,
        ] {
            for to in [
                TaskStatus::Pending,
                TaskStatus::InProgress,
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Superseded,
            ] {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn superseded_only_reachable_from_pending() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Superseded));
        assert!(!TaskStatus::InProgress.can_transition_to(TaskStatus::Superseded));
    }

    #[test]
    fn service_request_cannot_complete_without_dispatch() {
        assert!(!ServiceRequestStatus::Pending.can_transition_to(ServiceRequestStatus::Completed));
        assert!(ServiceRequestStatus::Pending.can_transition_to(ServiceRequestStatus::Failed));
        assert!(!ServiceRequestStatus::Completed.can_transition_to(ServiceRequestStatus::Failed));
    }
}
