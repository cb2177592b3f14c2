// Copyright 2023 Remi Bernotavicius

use crate::database;
use crate::database::models::{NewUser, User, UserId};
use crate::error::QueryResultExt as _;
use crate::page::{Page, Pagination};
use crate::policy::{self, Action, Actor, Policy};
use crate::relations;
use crate::{Error, Result};
use diesel::prelude::Connection as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use std::ops::RangeInclusive;

pub const USERNAME_LENGTH: RangeInclusive<usize> = 3..=30;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MAX_NAME_LENGTH: usize = 150;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub user: User,
    /// Whether the actor who asked follows this user.
    pub is_subscribed: bool,
}

pub fn validate_username(username: &str) -> Result<()> {
    if !USERNAME_LENGTH.contains(&username.chars().count()) {
        return Err(Error::validation(
            "username",
            format!(
                "must be between {} and {} characters",
                USERNAME_LENGTH.start(),
                USERNAME_LENGTH.end()
            ),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::validation(
            "username",
            "may only contain letters, digits and underscores",
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    if email.chars().count() > MAX_EMAIL_LENGTH {
        return Err(Error::validation(
            "email",
            format!("must be at most {MAX_EMAIL_LENGTH} characters"),
        ));
    }
    let well_formed = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !well_formed {
        return Err(Error::validation("email", "enter a valid email address"));
    }
    Ok(())
}

fn validate_name(field: &'static str, value: &str) -> Result<()> {
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::validation(
            field,
            format!("must be at most {MAX_NAME_LENGTH} characters"),
        ));
    }
    Ok(())
}

pub fn create_user(conn: &mut database::Connection, new_user: &NewUser) -> Result<User> {
    use database::schema::users::dsl::*;

    validate_username(&new_user.username)?;
    validate_email(&new_user.email)?;
    validate_name("first_name", &new_user.first_name)?;
    validate_name("last_name", &new_user.last_name)?;

    conn.transaction(|conn| {
        let username_taken: bool = diesel::select(diesel::dsl::exists(
            users.filter(username.eq(&new_user.username)),
        ))
        .get_result(conn)?;
        if username_taken {
            return Err(Error::Duplicate(format!("user {:?}", new_user.username)));
        }
        let email_taken: bool =
            diesel::select(diesel::dsl::exists(users.filter(email.eq(&new_user.email))))
                .get_result(conn)?;
        if email_taken {
            return Err(Error::Duplicate(format!("email {:?}", new_user.email)));
        }

        let user = diesel::insert_into(users)
            .values(new_user)
            .returning(User::as_returning())
            .get_result(conn)
            .or_duplicate(format!("user {:?}", new_user.username))?;
        log::info!("created user {} ({})", user.username, user.id);
        Ok(user)
    })
}

pub(crate) fn load_user(conn: &mut database::Connection, user_id: UserId) -> Result<User> {
    use database::schema::users::dsl::*;

    users
        .find(user_id)
        .select(User::as_select())
        .get_result(conn)
        .or_not_found(format!("user {user_id}"))
}

pub fn find_user_by_username(conn: &mut database::Connection, name: &str) -> Result<User> {
    use database::schema::users::dsl::*;

    users
        .filter(username.eq(name))
        .select(User::as_select())
        .get_result(conn)
        .or_not_found(format!("user {name:?}"))
}

pub fn get_user(
    conn: &mut database::Connection,
    actor: &Actor,
    user_id: UserId,
) -> Result<UserProfile> {
    let user = load_user(conn, user_id)?;
    let is_subscribed = relations::is_following(conn, actor, user.id)?;
    Ok(UserProfile {
        user,
        is_subscribed,
    })
}

pub fn list_users(
    conn: &mut database::Connection,
    actor: &Actor,
    pagination: Pagination,
) -> Result<Page<UserProfile>> {
    use database::schema::users::dsl::*;

    let total: i64 = users.count().get_result(conn)?;
    let window = users
        .select(User::as_select())
        .order_by(username.asc())
        .limit(pagination.sql_limit())
        .offset(pagination.sql_offset())
        .load(conn)?;
    Page::new(total, window).try_map(|user| {
        let is_subscribed = relations::is_following(conn, actor, user.id)?;
        Ok(UserProfile {
            user,
            is_subscribed,
        })
    })
}

/// Removes the user and, through the foreign keys, their recipes, follows in
/// both directions, favorites and cart.
pub fn delete_user(conn: &mut database::Connection, actor: &Actor, user_id: UserId) -> Result<()> {
    use database::schema::users::dsl::*;

    conn.transaction(|conn| {
        let user = load_user(conn, user_id)?;
        policy::check_access(Policy::OwnerOrStaff, Action::Write, actor, &user)
            .ensure("delete this user")?;
        diesel::delete(users.find(user.id)).execute(conn)?;
        log::info!("deleted user {} ({})", user.username, user.id);
        Ok(())
    })
}

#[cfg(test)]
use database::test_util;

#[test]
fn username_rules() {
    for good in ["bob", "chef_42", "A_very_long_username_of_30_chr"] {
        validate_username(good).unwrap();
    }
    for bad in ["al", "has space", "dash-ed", "thirty_one_characters_username_"] {
        assert!(matches!(
            validate_username(bad),
            Err(Error::Validation {
                field: "username",
                ..
            })
        ));
    }
}

#[test]
fn email_rules() {
    validate_email("cook@example.com").unwrap();
    for bad in ["", "cook", "@example.com", "cook@", "a@b@c", "co ok@example.com"] {
        assert!(validate_email(bad).is_err(), "{bad:?} accepted");
    }
}

#[test]
fn duplicate_username_and_email() {
    let mut conn = test_util::connection();
    test_util::user(&mut conn, "julia");

    let err = create_user(
        &mut conn,
        &NewUser {
            username: "julia".into(),
            email: "other@example.com".into(),
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, Error::Duplicate(_)));

    let err = create_user(
        &mut conn,
        &NewUser {
            username: "julia2".into(),
            email: "julia@example.com".into(),
            ..Default::default()
        },
    )
    .unwrap_err();
    assert!(matches!(err, Error::Duplicate(what) if what.starts_with("email")));
}

#[test]
fn profiles_report_subscriptions() {
    let mut conn = test_util::connection();
    let julia = test_util::user(&mut conn, "julia");
    let jacques = test_util::user(&mut conn, "jacques");
    let actor = Actor::from(&julia);

    relations::toggle_follow(&mut conn, &actor, jacques.id, relations::Toggle::Add).unwrap();

    assert!(get_user(&mut conn, &actor, jacques.id).unwrap().is_subscribed);
    assert!(!get_user(&mut conn, &actor, julia.id).unwrap().is_subscribed);
    assert!(
        !get_user(&mut conn, &Actor::Anonymous, jacques.id)
            .unwrap()
            .is_subscribed
    );

    let page = list_users(&mut conn, &actor, Pagination::new(1, 0)).unwrap();
    assert_eq!(page.count, 2);
    assert_eq!(page.results[0].user.username, "jacques");
    assert!(page.results[0].is_subscribed);

    assert!(matches!(
        get_user(&mut conn, &actor, UserId(99)),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn only_self_or_staff_delete_users() {
    let mut conn = test_util::connection();
    let julia = test_util::user(&mut conn, "julia");
    let jacques = test_util::user(&mut conn, "jacques");
    let admin = test_util::staff(&mut conn, "admin");

    assert!(matches!(
        delete_user(&mut conn, &Actor::from(&jacques), julia.id),
        Err(Error::Permission(_))
    ));
    delete_user(&mut conn, &Actor::from(&julia), julia.id).unwrap();
    delete_user(&mut conn, &Actor::from(&admin), jacques.id).unwrap();
    assert!(matches!(
        find_user_by_username(&mut conn, "jacques"),
        Err(Error::NotFound(_))
    ));
}
