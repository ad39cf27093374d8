use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Guest,
    Member,
    Trainer,
    Admin,
}

/// Who is calling. Resolved by the login layer and passed into every
/// mutating engine call; the engine keeps no notion of a current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub role: Role,
    pub member_id: Option<Ulid>,
    pub trainer_id: Option<Ulid>,
}

impl Session {
    pub fn guest() -> Self {
        Self { role: Role::Guest, member_id: None, trainer_id: None }
    }

    pub fn member(member_id: Ulid) -> Self {
        Self { role: Role::Member, member_id: Some(member_id), trainer_id: None }
    }

    pub fn trainer(trainer_id: Ulid) -> Self {
        Self { role: Role::Trainer, member_id: None, trainer_id: Some(trainer_id) }
    }

    pub fn admin() -> Self {
        Self { role: Role::Admin, member_id: None, trainer_id: None }
    }

    pub fn require_admin(&self) -> Result<(), EngineError> {
        match self.role {
            Role::Admin => Ok(()),
            _ => Err(EngineError::Unauthorized("admin access only")),
        }
    }

    /// Admins manage every trainer; a trainer only their own calendar.
    pub fn require_trainer_access(&self, trainer_id: Ulid) -> Result<(), EngineError> {
        match (self.role, self.trainer_id) {
            (Role::Admin, _) => Ok(()),
            (Role::Trainer, Some(own)) if own == trainer_id => Ok(()),
            (Role::Trainer, _) => Err(EngineError::Unauthorized(
                "trainers may only manage their own availability",
            )),
            _ => Err(EngineError::Unauthorized("staff access only")),
        }
    }

    pub fn require_member(&self) -> Result<Ulid, EngineError> {
        match (self.role, self.member_id) {
            (Role::Member, Some(id)) => Ok(id),
            _ => Err(EngineError::Unauthorized("member login required")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trainer_access() {
        let own = Ulid::new();
        let other = Ulid::new();
        assert!(Session::admin().require_trainer_access(other).is_ok());
        assert!(Session::trainer(own).require_trainer_access(own).is_ok());
        assert!(Session::trainer(own).require_trainer_access(other).is_err());
        assert!(Session::member(Ulid::new()).require_trainer_access(own).is_err());
        assert!(Session::guest().require_trainer_access(own).is_err());
    }

    #[test]
    fn member_resolution() {
        let id = Ulid::new();
        assert_eq!(Session::member(id).require_member().unwrap(), id);
        assert!(Session::admin().require_member().is_err());
        let unresolved = Session { role: Role::Member, member_id: None, trainer_id: None };
        assert!(unresolved.require_member().is_err());
    }

    #[test]
    fn admin_only() {
        assert!(Session::admin().require_admin().is_ok());
        assert!(Session::trainer(Ulid::new()).require_admin().is_err());
    }
}
