//! Normalized events consumed from the messaging transport.

use crate::interaction::PlanOp;
use crate::tenant::{OwnerId, Tier};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEvent {
    pub owner_id: OwnerId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEvent {
    pub owner_id: OwnerId,
    pub filename: String,
    pub content: Vec<u8>,
}

/// A document the transport announced but could not fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailedEvent {
    pub owner_id: OwnerId,
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEvent {
    pub owner_id: OwnerId,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text(TextEvent),
    Document(DocumentEvent),
    DocumentFailed(DocumentFailedEvent),
    Action(ActionEvent),
}

impl InboundEvent {
    pub fn owner_id(&self) -> OwnerId {
        match self {
            InboundEvent::Text(e) => e.owner_id,
            InboundEvent::Document(e) => e.owner_id,
            InboundEvent::DocumentFailed(e) => e.owner_id,
            InboundEvent::Action(e) => e.owner_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Text(_) => "text",
            InboundEvent::Document(_) => "document",
            InboundEvent::DocumentFailed(_) => "document_failed",
            InboundEvent::Action(_) => "action",
        }
    }
}

/// Discrete menu actions, parsed from the transport's action tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ShowPanel,
    InitiateUpload,
    ListInstances,
    ListAllInstances,
    Stop(String),
    Restart(String),
    ViewLogs(String),
    FullLog(String),
    KillAll,
    ListTenants,
    InitiateBroadcast,
    PlanMenu,
    InitiatePlanChange { op: PlanOp, tier: Tier },
    Noop,
}

impl Action {
    /// Actions only the privileged operator may trigger.
    pub fn requires_operator(&self) -> bool {
        matches!(
            self,
            Action::ListAllInstances
                | Action::KillAll
                | Action::ListTenants
                | Action::InitiateBroadcast
                | Action::PlanMenu
                | Action::InitiatePlanChange { .. }
        )
    }

    pub fn tag(&self) -> String {
        match self {
            Action::ShowPanel => "panel".to_string(),
            Action::InitiateUpload => "upload_bot".to_string(),
            Action::ListInstances => "my_bots".to_string(),
            Action::ListAllInstances => "all_bots".to_string(),
            Action::Stop(id) => format!("stop:{id}"),
            Action::Restart(id) => format!("restart:{id}"),
            Action::ViewLogs(id) => format!("logs:{id}"),
            Action::FullLog(id) => format!("logfile:{id}"),
            Action::KillAll => "kill_all".to_string(),
            Action::ListTenants => "all_users".to_string(),
            Action::InitiateBroadcast => "broadcast".to_string(),
            Action::PlanMenu => "plans".to_string(),
            Action::InitiatePlanChange { op, tier } => format!("{op}_{tier}"),
            Action::Noop => "noop".to_string(),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let targeted = |id: &str| -> Result<String, String> {
            if id.is_empty() {
                Err(format!("action tag '{tag}' is missing an instance id"))
            } else {
                Ok(id.to_string())
            }
        };

        if let Some((verb, id)) = tag.split_once(':') {
            return match verb {
                "stop" => Ok(Action::Stop(targeted(id)?)),
                "restart" => Ok(Action::Restart(targeted(id)?)),
                "logs" => Ok(Action::ViewLogs(targeted(id)?)),
                "logfile" => Ok(Action::FullLog(targeted(id)?)),
                _ => Err(format!("unknown action tag: {tag}")),
            };
        }

        match tag {
            "panel" => Ok(Action::ShowPanel),
            "upload_bot" => Ok(Action::InitiateUpload),
            "my_bots" => Ok(Action::ListInstances),
            "all_bots" => Ok(Action::ListAllInstances),
            "kill_all" => Ok(Action::KillAll),
            "all_users" => Ok(Action::ListTenants),
            "broadcast" => Ok(Action::InitiateBroadcast),
            "plans" => Ok(Action::PlanMenu),
            "noop" => Ok(Action::Noop),
            _ => {
                let (op, tier) = tag
                    .split_once('_')
                    .ok_or_else(|| format!("unknown action tag: {tag}"))?;
                let op = match op {
                    "grant" => PlanOp::Grant,
                    "revoke" => PlanOp::Revoke,
                    _ => return Err(format!("unknown action tag: {tag}")),
                };
                let tier = tier.parse::<Tier>()?;
                Ok(Action::InitiatePlanChange { op, tier })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_tags() {
        assert_eq!("upload_bot".parse::<Action>().unwrap(), Action::InitiateUpload);
        assert_eq!("my_bots".parse::<Action>().unwrap(), Action::ListInstances);
        assert_eq!("kill_all".parse::<Action>().unwrap(), Action::KillAll);
        assert_eq!("all_users".parse::<Action>().unwrap(), Action::ListTenants);
    }

    #[test]
    fn test_parse_targeted_tags() {
        assert_eq!(
            "restart:42_abc".parse::<Action>().unwrap(),
            Action::Restart("42_abc".to_string())
        );
        assert_eq!(
            "logfile:42_abc".parse::<Action>().unwrap(),
            Action::FullLog("42_abc".to_string())
        );
        assert!("stop:".parse::<Action>().is_err());
        assert!("explode:42_abc".parse::<Action>().is_err());
    }

    #[test]
    fn test_parse_plan_change_tags() {
        assert_eq!(
            "grant_premium".parse::<Action>().unwrap(),
            Action::InitiatePlanChange {
                op: PlanOp::Grant,
                tier: Tier::Premium
            }
        );
        assert_eq!(
            "revoke_vip".parse::<Action>().unwrap(),
            Action::InitiatePlanChange {
                op: PlanOp::Revoke,
                tier: Tier::Vip
            }
        );
        assert!("grant_gold".parse::<Action>().is_err());
        assert!("nonsense".parse::<Action>().is_err());
    }

    #[test]
    fn test_tag_roundtrip_for_menu_actions() {
        let actions = vec![
            Action::ShowPanel,
            Action::InitiateUpload,
            Action::Stop("7_a".to_string()),
            Action::ViewLogs("7_a".to_string()),
            Action::InitiatePlanChange {
                op: PlanOp::Revoke,
                tier: Tier::Premium,
            },
            Action::Noop,
        ];
        for action in actions {
            assert_eq!(action.tag().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn test_operator_only_actions() {
        assert!(Action::KillAll.requires_operator());
        assert!(Action::InitiateBroadcast.requires_operator());
        assert!(!Action::InitiateUpload.requires_operator());
        assert!(!Action::Stop("1_a".to_string()).requires_operator());
    }

    #[test]
    fn test_event_owner_and_kind() {
        let event = InboundEvent::Text(TextEvent {
            owner_id: 9,
            text: "hi".to_string(),
        });
        assert_eq!(event.owner_id(), 9);
        assert_eq!(event.kind(), "text");
    }
}
