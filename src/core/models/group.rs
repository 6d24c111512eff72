use super::user::{Participant, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A group of people sharing expenses. The creator is always a member.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub created_by: Participant,
    members: Vec<Participant>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Group {
    /// Builds a group, dropping duplicate members and adding the creator
    /// first if the member list does not already contain them.
    pub fn new(
        id: GroupId,
        name: String,
        description: String,
        created_by: Participant,
        members: Vec<Participant>,
        created_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut group = Group {
            id,
            name,
            description,
            created_by: created_by.clone(),
            members: Vec::with_capacity(members.len() + 1),
            created_at,
        };
        if !members.iter().any(|m| m.id == created_by.id) {
            group.members.push(created_by);
        }
        for member in members {
            group.add_member(member);
        }
        group
    }

    pub fn members(&self) -> &[Participant] {
        &self.members
    }

    pub fn member(&self, user_id: UserId) -> Option<&Participant> {
        self.members.iter().find(|m| m.id == user_id)
    }

    pub fn is_member(&self, user_id: UserId) -> bool {
        self.member(user_id).is_some()
    }

    pub fn is_creator(&self, user_id: UserId) -> bool {
        self.created_by.id == user_id
    }

    /// Returns `false` when the participant was already a member.
    pub fn add_member(&mut self, participant: Participant) -> bool {
        if self.is_member(participant.id) {
            return false;
        }
        self.members.push(participant);
        true
    }
}
