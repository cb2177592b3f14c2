// Copyright 2023 Remi Bernotavicius

//! Who may do what.
//!
//! Every predicate here is a pure function of the action, the acting
//! identity and (where relevant) the owner of the resource. The store
//! operations call them before touching any row, so a denial never leaves a
//! partial effect behind.

use crate::database::models::{Ingredient, Recipe, Tag, User, UserId};
use crate::{Error, Result};
use derive_more::Display;
use strum::EnumIter;

#[derive(Debug, Display, EnumIter, Hash, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    #[display("read")]
    Read,
    #[display("write")]
    Write,
}

impl Action {
    pub fn is_safe(&self) -> bool {
        *self == Self::Read
    }

    pub fn iter() -> impl Iterator<Item = Self> {
        <Self as strum::IntoEnumIterator>::iter()
    }
}

/// The authenticated user as vouched for by the identity provider.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub is_active: bool,
    pub is_staff: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Actor {
    Anonymous,
    User(Identity),
}

impl Actor {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Anonymous => None,
            Self::User(identity) => Some(identity.id),
        }
    }

    fn active_identity(&self) -> Option<&Identity> {
        match self {
            Self::User(identity) if identity.is_active => Some(identity),
            _ => None,
        }
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self::User(Identity {
            id: user.id,
            is_active: user.is_active,
            is_staff: user.is_staff,
        })
    }
}

/// Anything a permission can be checked against.
pub trait Owned {
    fn owner(&self) -> Option<UserId>;
}

impl Owned for Recipe {
    fn owner(&self) -> Option<UserId> {
        Some(self.author_id)
    }
}

impl Owned for User {
    fn owner(&self) -> Option<UserId> {
        Some(self.id)
    }
}

impl Owned for Tag {
    fn owner(&self) -> Option<UserId> {
        None
    }
}

impl Owned for Ingredient {
    fn owner(&self) -> Option<UserId> {
        None
    }
}

#[derive(Debug, Display, Copy, Clone, PartialEq, Eq)]
pub enum Access {
    #[display("allow")]
    Allow,
    #[display("deny")]
    Deny,
}

impl Access {
    fn from_bool(allowed: bool) -> Self {
        if allowed {
            Self::Allow
        } else {
            Self::Deny
        }
    }

    pub fn is_allowed(&self) -> bool {
        *self == Self::Allow
    }

    /// Turns a denial into [`Error::Permission`]; `what` completes the
    /// sentence "you may not ...".
    pub fn ensure(self, what: &str) -> Result<()> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny => Err(Error::Permission(format!("you may not {what}"))),
        }
    }
}

#[derive(Debug, Display, EnumIter, Hash, Copy, Clone, PartialEq, Eq)]
pub enum Policy {
    #[display("authenticated or read-only")]
    Authenticated,
    #[display("owner, staff or read-only")]
    OwnerOrStaff,
    #[display("admin or read-only")]
    AdminOnly,
}

impl Policy {
    pub fn iter() -> impl Iterator<Item = Self> {
        <Self as strum::IntoEnumIterator>::iter()
    }
}

pub fn public_read(action: Action) -> Access {
    Access::from_bool(action.is_safe())
}

pub fn authenticated(action: Action, actor: &Actor) -> Access {
    Access::from_bool(action.is_safe() || actor.active_identity().is_some())
}

pub fn owner_or_staff(action: Action, actor: &Actor, owner: Option<UserId>) -> Access {
    if action.is_safe() {
        return Access::Allow;
    }
    Access::from_bool(
        actor
            .active_identity()
            .is_some_and(|i| i.is_staff || Some(i.id) == owner),
    )
}

pub fn admin_only(action: Action, actor: &Actor) -> Access {
    if action.is_safe() {
        return Access::Allow;
    }
    Access::from_bool(actor.active_identity().is_some_and(|i| i.is_staff))
}

pub fn check_access(
    policy: Policy,
    action: Action,
    actor: &Actor,
    resource: &impl Owned,
) -> Access {
    let access = match policy {
        Policy::Authenticated => authenticated(action, actor),
        Policy::OwnerOrStaff => owner_or_staff(action, actor, resource.owner()),
        Policy::AdminOnly => admin_only(action, actor),
    };
    if !access.is_allowed() {
        log::debug!("{actor:?} denied {action} under policy {policy}");
    }
    access
}

/// The id of an active, authenticated actor, or a permission error naming
/// what they tried to do.
pub fn require_active_user(actor: &Actor, what: &str) -> Result<UserId> {
    authenticated(Action::Write, actor).ensure(what)?;
    actor
        .user_id()
        .ok_or_else(|| Error::Permission(format!("you may not {what}")))
}

#[cfg(test)]
fn identity(id: i32, is_active: bool, is_staff: bool) -> Actor {
    Actor::User(Identity {
        id: UserId(id),
        is_active,
        is_staff,
    })
}

#[cfg(test)]
fn recipe_owned_by(author: i32) -> Recipe {
    Recipe {
        id: crate::database::models::RecipeId(1),
        author_id: UserId(author),
        name: "soup".into(),
        image: "recipes/soup.png".into(),
        text: String::new(),
        cooking_time: 10,
        created_at: chrono::NaiveDateTime::default(),
    }
}

#[test]
fn reads_are_always_allowed() {
    let recipe = recipe_owned_by(1);
    let actors = [
        Actor::Anonymous,
        identity(1, true, false),
        identity(2, false, false),
        identity(3, true, true),
    ];
    for policy in Policy::iter() {
        for actor in &actors {
            assert_eq!(
                check_access(policy, Action::Read, actor, &recipe),
                Access::Allow
            );
        }
    }
    for action in Action::iter() {
        assert_eq!(public_read(action).is_allowed(), action.is_safe());
    }
}

#[test]
fn anonymous_writes_are_denied() {
    let recipe = recipe_owned_by(1);
    for policy in Policy::iter() {
        assert_eq!(
            check_access(policy, Action::Write, &Actor::Anonymous, &recipe),
            Access::Deny
        );
    }
}

#[test]
fn owner_or_staff_writes() {
    let recipe = recipe_owned_by(1);
    let check = |actor| check_access(Policy::OwnerOrStaff, Action::Write, &actor, &recipe);

    assert_eq!(check(identity(1, true, false)), Access::Allow);
    assert_eq!(check(identity(2, true, false)), Access::Deny);
    assert_eq!(check(identity(2, true, true)), Access::Allow);

    // Inactive accounts lose their rights, staff or not.
    assert_eq!(check(identity(1, false, false)), Access::Deny);
    assert_eq!(check(identity(2, false, true)), Access::Deny);
}

#[test]
fn admin_only_writes() {
    let tag = Tag {
        id: crate::database::models::TagId(1),
        name: "Breakfast".into(),
        color: "#E26C2D".into(),
        slug: "breakfast".into(),
    };
    let check = |actor| check_access(Policy::AdminOnly, Action::Write, &actor, &tag);

    assert_eq!(check(identity(1, true, true)), Access::Allow);
    assert_eq!(check(identity(1, true, false)), Access::Deny);
    assert_eq!(check(identity(1, false, true)), Access::Deny);
}

#[test]
fn require_active_user_errors() {
    assert_eq!(
        require_active_user(&identity(4, true, false), "post").unwrap(),
        UserId(4)
    );
    for actor in [Actor::Anonymous, identity(4, false, true)] {
        let err = require_active_user(&actor, "post").unwrap_err();
        assert!(matches!(err, Error::Permission(m) if m == "you may not post"));
    }
}
