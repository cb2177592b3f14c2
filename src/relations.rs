// Copyright 2023 Remi Bernotavicius

//! Follows, favorites and cart membership.
//!
//! All three are toggles over a unique (user, target) pair: adding an
//! existing pair is [`Error::Duplicate`], removing a missing one is
//! [`Error::NotFound`]. The pre-check gives the friendly error; the unique
//! constraint decides any race between two concurrent adds.

use crate::catalog;
use crate::database;
use crate::database::models::{Follow, RecipeId, RecipeSummary, User, UserId};
use crate::error::QueryResultExt as _;
use crate::page::{Page, Pagination};
use crate::policy::{self, Actor};
use crate::users;
use crate::{Error, Result};
use derive_more::Display;
use diesel::prelude::Connection as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use strum::EnumIter;

#[derive(Debug, Display, EnumIter, Hash, Copy, Clone, PartialEq, Eq)]
pub enum Toggle {
    #[display("add")]
    Add,
    #[display("remove")]
    Remove,
}

impl Toggle {
    pub fn iter() -> impl Iterator<Item = Self> {
        <Self as strum::IntoEnumIterator>::iter()
    }
}

pub fn is_following(
    conn: &mut database::Connection,
    actor: &Actor,
    author: UserId,
) -> Result<bool> {
    use database::schema::follows::dsl::*;

    match actor.user_id() {
        Some(me) if me != author => Ok(diesel::select(diesel::dsl::exists(
            follows
                .filter(follower_id.eq(me))
                .filter(author_id.eq(author)),
        ))
        .get_result(conn)?),
        _ => Ok(false),
    }
}

pub fn is_favorited(
    conn: &mut database::Connection,
    actor: &Actor,
    recipe: RecipeId,
) -> Result<bool> {
    use database::schema::favorites::dsl::*;

    let Some(me) = actor.user_id() else {
        return Ok(false);
    };
    Ok(diesel::select(diesel::dsl::exists(
        favorites
            .filter(user_id.eq(me))
            .filter(recipe_id.eq(recipe)),
    ))
    .get_result(conn)?)
}

pub fn is_in_cart(
    conn: &mut database::Connection,
    actor: &Actor,
    recipe: RecipeId,
) -> Result<bool> {
    use database::schema::cart_items::dsl::*;

    let Some(me) = actor.user_id() else {
        return Ok(false);
    };
    Ok(diesel::select(diesel::dsl::exists(
        cart_items
            .filter(user_id.eq(me))
            .filter(recipe_id.eq(recipe)),
    ))
    .get_result(conn)?)
}

pub fn toggle_follow(
    conn: &mut database::Connection,
    actor: &Actor,
    author: UserId,
    toggle: Toggle,
) -> Result<()> {
    use database::schema::follows::dsl::*;

    let follower = policy::require_active_user(actor, "follow users")?;
    if follower == author {
        return Err(Error::SelfFollow);
    }

    conn.transaction(|conn| {
        users::load_user(conn, author)?;
        let edge = follows
            .filter(follower_id.eq(follower))
            .filter(author_id.eq(author));
        let what = format!("subscription to user {author}");
        match toggle {
            Toggle::Add => {
                let exists: bool = diesel::select(diesel::dsl::exists(edge)).get_result(conn)?;
                if exists {
                    return Err(Error::Duplicate(what));
                }
                diesel::insert_into(follows)
                    .values((follower_id.eq(follower), author_id.eq(author)))
                    .execute(conn)
                    .or_duplicate(&what)?;
            }
            Toggle::Remove => {
                if diesel::delete(edge).execute(conn)? == 0 {
                    return Err(Error::NotFound(what));
                }
            }
        }
        log::info!("user {follower}: {toggle} {what}");
        Ok(())
    })
}

pub fn toggle_favorite(
    conn: &mut database::Connection,
    actor: &Actor,
    recipe: RecipeId,
    toggle: Toggle,
) -> Result<()> {
    use database::schema::favorites::dsl::*;

    let user = policy::require_active_user(actor, "manage favorites")?;

    conn.transaction(|conn| {
        catalog::load_recipe(conn, recipe)?;
        let membership = favorites
            .filter(user_id.eq(user))
            .filter(recipe_id.eq(recipe));
        let what = format!("recipe {recipe} in favorites");
        match toggle {
            Toggle::Add => {
                let exists: bool =
                    diesel::select(diesel::dsl::exists(membership)).get_result(conn)?;
                if exists {
                    return Err(Error::Duplicate(what));
                }
                diesel::insert_into(favorites)
                    .values((user_id.eq(user), recipe_id.eq(recipe)))
                    .execute(conn)
                    .or_duplicate(&what)?;
            }
            Toggle::Remove => {
                if diesel::delete(membership).execute(conn)? == 0 {
                    return Err(Error::NotFound(what));
                }
            }
        }
        log::info!("user {user}: {toggle} {what}");
        Ok(())
    })
}

pub fn toggle_cart(
    conn: &mut database::Connection,
    actor: &Actor,
    recipe: RecipeId,
    toggle: Toggle,
) -> Result<()> {
    use database::schema::cart_items::dsl::*;

    let user = policy::require_active_user(actor, "manage a shopping cart")?;

    conn.transaction(|conn| {
        catalog::load_recipe(conn, recipe)?;
        let membership = cart_items
            .filter(user_id.eq(user))
            .filter(recipe_id.eq(recipe));
        let what = format!("recipe {recipe} in shopping cart");
        match toggle {
            Toggle::Add => {
                let exists: bool =
                    diesel::select(diesel::dsl::exists(membership)).get_result(conn)?;
                if exists {
                    return Err(Error::Duplicate(what));
                }
                diesel::insert_into(cart_items)
                    .values((
                        user_id.eq(user),
                        recipe_id.eq(recipe),
                        added_at.eq(chrono::Utc::now().naive_utc()),
                    ))
                    .execute(conn)
                    .or_duplicate(&what)?;
            }
            Toggle::Remove => {
                if diesel::delete(membership).execute(conn)? == 0 {
                    return Err(Error::NotFound(what));
                }
            }
        }
        log::info!("user {user}: {toggle} {what}");
        Ok(())
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub author: User,
    /// Newest first, cut to the requested limit.
    pub recipes: Vec<RecipeSummary>,
    pub recipes_count: i64,
}

/// The authors the actor follows, most recently followed first.
pub fn subscriptions(
    conn: &mut database::Connection,
    actor: &Actor,
    recipes_limit: Option<usize>,
    pagination: Pagination,
) -> Result<Page<Subscription>> {
    use database::schema::follows::dsl::*;
    use database::schema::recipes;

    let me = actor
        .user_id()
        .ok_or_else(|| Error::Permission("you may not list subscriptions".into()))?;

    let total: i64 = follows
        .filter(follower_id.eq(me))
        .count()
        .get_result(conn)?;
    let edges = follows
        .filter(follower_id.eq(me))
        .order_by(id.desc())
        .select(Follow::as_select())
        .limit(pagination.sql_limit())
        .offset(pagination.sql_offset())
        .load(conn)?;

    Page::new(total, edges).try_map(|edge| {
        let author = users::load_user(conn, edge.author_id)?;
        let recipes_count = recipes::table
            .filter(recipes::author_id.eq(author.id))
            .count()
            .get_result(conn)?;

        let mut query = recipes::table
            .filter(recipes::author_id.eq(author.id))
            .select(RecipeSummary::as_select())
            .order_by((recipes::created_at.desc(), recipes::id.desc()))
            .into_boxed();
        if let Some(limit) = recipes_limit {
            query = query.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        Ok(Subscription {
            author,
            recipes: query.load(conn)?,
            recipes_count,
        })
    })
}

#[cfg(test)]
use crate::database::models::Recipe;
#[cfg(test)]
use database::test_util;

#[cfg(test)]
fn soup_for(conn: &mut database::Connection, author: &User) -> Recipe {
    let water = test_util::ingredient(conn, "water", "ml");
    let lunch = test_util::tag(conn, "Lunch", "#00FF00", "lunch");
    test_util::recipe(conn, author, "Soup", &[&lunch], &[(&water, 500)])
}

#[test]
fn self_follow_always_fails() {
    let mut conn = test_util::connection();
    let julia = test_util::user(&mut conn, "julia");

    for toggle in Toggle::iter() {
        assert!(matches!(
            toggle_follow(&mut conn, &Actor::from(&julia), julia.id, toggle),
            Err(Error::SelfFollow)
        ));
    }
}

#[test]
fn follow_toggle() {
    let mut conn = test_util::connection();
    let julia = test_util::user(&mut conn, "julia");
    let jacques = test_util::user(&mut conn, "jacques");
    let actor = Actor::from(&julia);

    toggle_follow(&mut conn, &actor, jacques.id, Toggle::Add).unwrap();
    assert!(matches!(
        toggle_follow(&mut conn, &actor, jacques.id, Toggle::Add),
        Err(Error::Duplicate(_))
    ));
    assert!(is_following(&mut conn, &actor, jacques.id).unwrap());
    assert!(!is_following(&mut conn, &Actor::from(&jacques), julia.id).unwrap());

    toggle_follow(&mut conn, &actor, jacques.id, Toggle::Remove).unwrap();
    assert!(matches!(
        toggle_follow(&mut conn, &actor, jacques.id, Toggle::Remove),
        Err(Error::NotFound(_))
    ));

    assert!(matches!(
        toggle_follow(&mut conn, &actor, UserId(404), Toggle::Add),
        Err(Error::NotFound(what)) if what == "user 404"
    ));
    assert!(matches!(
        toggle_follow(&mut conn, &Actor::Anonymous, jacques.id, Toggle::Add),
        Err(Error::Permission(_))
    ));
}

#[test]
fn favorite_toggle() {
    let mut conn = test_util::connection();
    let julia = test_util::user(&mut conn, "julia");
    let soup = soup_for(&mut conn, &julia);
    let actor = Actor::from(&julia);

    toggle_favorite(&mut conn, &actor, soup.id, Toggle::Add).unwrap();
    assert!(matches!(
        toggle_favorite(&mut conn, &actor, soup.id, Toggle::Add),
        Err(Error::Duplicate(_))
    ));
    assert!(is_favorited(&mut conn, &actor, soup.id).unwrap());

    toggle_favorite(&mut conn, &actor, soup.id, Toggle::Remove).unwrap();
    assert!(matches!(
        toggle_favorite(&mut conn, &actor, soup.id, Toggle::Remove),
        Err(Error::NotFound(_))
    ));
    assert!(!is_favorited(&mut conn, &actor, soup.id).unwrap());

    assert!(matches!(
        toggle_favorite(&mut conn, &actor, RecipeId(404), Toggle::Add),
        Err(Error::NotFound(what)) if what == "recipe 404"
    ));
}

#[test]
fn cart_toggle_mirrors_favorites() {
    let mut conn = test_util::connection();
    let julia = test_util::user(&mut conn, "julia");
    let jacques = test_util::user(&mut conn, "jacques");
    let soup = soup_for(&mut conn, &julia);
    let actor = Actor::from(&jacques);

    toggle_cart(&mut conn, &actor, soup.id, Toggle::Add).unwrap();
    assert!(matches!(
        toggle_cart(&mut conn, &actor, soup.id, Toggle::Add),
        Err(Error::Duplicate(_))
    ));
    assert!(is_in_cart(&mut conn, &actor, soup.id).unwrap());
    assert!(!is_in_cart(&mut conn, &Actor::from(&julia), soup.id).unwrap());
    assert!(!is_in_cart(&mut conn, &Actor::Anonymous, soup.id).unwrap());

    toggle_cart(&mut conn, &actor, soup.id, Toggle::Remove).unwrap();
    assert!(matches!(
        toggle_cart(&mut conn, &actor, soup.id, Toggle::Remove),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn inactive_users_cannot_toggle() {
    use database::schema::users as user_table;

    let mut conn = test_util::connection();
    let julia = test_util::user(&mut conn, "julia");
    let soup = soup_for(&mut conn, &julia);

    let mut inactive = test_util::user(&mut conn, "ghost");
    diesel::update(user_table::table.find(inactive.id))
        .set(user_table::is_active.eq(false))
        .execute(&mut conn)
        .unwrap();
    inactive.is_active = false;

    assert!(matches!(
        toggle_cart(&mut conn, &Actor::from(&inactive), soup.id, Toggle::Add),
        Err(Error::Permission(_))
    ));
}

#[test]
fn subscriptions_list_authors_with_recipes() {
    let mut conn = test_util::connection();
    let julia = test_util::user(&mut conn, "julia");
    let jacques = test_util::user(&mut conn, "jacques");
    let reader = test_util::user(&mut conn, "reader");

    let water = test_util::ingredient(&mut conn, "water", "ml");
    let lunch = test_util::tag(&mut conn, "Lunch", "#00FF00", "lunch");
    for name in ["Soup", "Stew", "Broth"] {
        test_util::recipe(&mut conn, &julia, name, &[&lunch], &[(&water, 100)]);
    }

    let actor = Actor::from(&reader);
    toggle_follow(&mut conn, &actor, julia.id, Toggle::Add).unwrap();
    toggle_follow(&mut conn, &actor, jacques.id, Toggle::Add).unwrap();

    let page = subscriptions(&mut conn, &actor, Some(2), Pagination::default()).unwrap();
    assert_eq!(page.count, 2);

    // Most recent follow first.
    assert_eq!(page.results[0].author.id, jacques.id);
    assert_eq!(page.results[0].recipes_count, 0);

    let of_julia = &page.results[1];
    assert_eq!(of_julia.recipes_count, 3);
    let names: Vec<_> = of_julia.recipes.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["Broth", "Stew"]);

    assert!(matches!(
        subscriptions(&mut conn, &Actor::Anonymous, None, Pagination::default()),
        Err(Error::Permission(_))
    ));
}

#[test]
fn deleting_a_user_cascades() {
    use database::schema::{cart_items, favorites, follows, recipes};

    let mut conn = test_util::connection();
    let julia = test_util::user(&mut conn, "julia");
    let jacques = test_util::user(&mut conn, "jacques");
    let soup = soup_for(&mut conn, &julia);
    let stew = {
        let beef = test_util::ingredient(&mut conn, "beef", "g");
        let dinner = test_util::tag(&mut conn, "Dinner", "#0000FF", "dinner");
        test_util::recipe(&mut conn, &jacques, "Stew", &[&dinner], &[(&beef, 300)])
    };

    let as_julia = Actor::from(&julia);
    let as_jacques = Actor::from(&jacques);
    toggle_follow(&mut conn, &as_julia, jacques.id, Toggle::Add).unwrap();
    toggle_follow(&mut conn, &as_jacques, julia.id, Toggle::Add).unwrap();
    toggle_favorite(&mut conn, &as_julia, stew.id, Toggle::Add).unwrap();
    toggle_cart(&mut conn, &as_julia, stew.id, Toggle::Add).unwrap();
    toggle_favorite(&mut conn, &as_jacques, soup.id, Toggle::Add).unwrap();
    toggle_cart(&mut conn, &as_jacques, soup.id, Toggle::Add).unwrap();

    users::delete_user(&mut conn, &as_julia, julia.id).unwrap();

    let count = |conn: &mut database::Connection| -> [i64; 4] {
        [
            recipes::table.count().get_result(conn).unwrap(),
            follows::table.count().get_result(conn).unwrap(),
            favorites::table.count().get_result(conn).unwrap(),
            cart_items::table.count().get_result(conn).unwrap(),
        ]
    };
    // Only Jacques' stew survives; every follow, favorite and cart row
    // involved Julia or her soup.
    assert_eq!(count(&mut conn), [1, 0, 0, 0]);
}

#[test]
fn unique_constraint_decides_concurrent_adds() {
    use database::schema::favorites;

    let mut conn = test_util::connection();
    let julia = test_util::user(&mut conn, "julia");
    let soup = soup_for(&mut conn, &julia);

    // A second writer that skipped the exists check, as if it lost the race.
    let insert = |conn: &mut database::Connection| {
        diesel::insert_into(favorites::table)
            .values((
                favorites::user_id.eq(julia.id),
                favorites::recipe_id.eq(soup.id),
            ))
            .execute(conn)
            .or_duplicate("recipe in favorites")
    };
    assert_eq!(insert(&mut conn).unwrap(), 1);
    assert!(matches!(insert(&mut conn), Err(Error::Duplicate(_))));

    assert!(matches!(
        toggle_favorite(&mut conn, &Actor::from(&julia), soup.id, Toggle::Add),
        Err(Error::Duplicate(_))
    ));
}
