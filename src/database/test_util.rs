// Copyright 2023 Remi Bernotavicius

use super::models::{Ingredient, NewIngredient, NewTag, NewUser, Recipe, Tag, User};
use super::schema;
use super::Connection;
use crate::catalog::{self, IngredientAmount, RecipePayload};
use crate::policy::Actor;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;

/// A fresh in-memory database with every migration applied.
pub fn connection() -> Connection {
    super::establish_connection(":memory:").unwrap()
}

pub fn user(conn: &mut Connection, username: &str) -> User {
    crate::users::create_user(
        conn,
        &NewUser {
            username: username.into(),
            email: format!("{username}@example.com"),
            ..Default::default()
        },
    )
    .unwrap()
}

pub fn staff(conn: &mut Connection, username: &str) -> User {
    crate::users::create_user(
        conn,
        &NewUser {
            username: username.into(),
            email: format!("{username}@example.com"),
            is_staff: true,
            ..Default::default()
        },
    )
    .unwrap()
}

pub fn ingredient(conn: &mut Connection, name: &str, measurement_unit: &str) -> Ingredient {
    diesel::insert_into(schema::ingredients::table)
        .values(NewIngredient {
            name: name.into(),
            measurement_unit: measurement_unit.into(),
        })
        .returning(Ingredient::as_returning())
        .get_result(conn)
        .unwrap()
}

pub fn tag(conn: &mut Connection, name: &str, color: &str, slug: &str) -> Tag {
    diesel::insert_into(schema::tags::table)
        .values(NewTag {
            name: name.into(),
            color: color.into(),
            slug: slug.into(),
        })
        .returning(Tag::as_returning())
        .get_result(conn)
        .unwrap()
}

pub fn payload(name: &str, tags: &[&Tag], lines: &[(&Ingredient, i32)]) -> RecipePayload {
    RecipePayload {
        name: name.into(),
        image: format!("recipes/{}.png", name.to_lowercase()),
        text: format!("How to make {name}."),
        cooking_time: 30,
        tags: tags.iter().map(|t| t.id).collect(),
        ingredients: lines
            .iter()
            .map(|(i, amount)| IngredientAmount {
                id: i.id,
                amount: *amount,
            })
            .collect(),
    }
}

pub fn recipe(
    conn: &mut Connection,
    author: &User,
    name: &str,
    tags: &[&Tag],
    lines: &[(&Ingredient, i32)],
) -> Recipe {
    catalog::create_recipe(conn, &Actor::from(author), &payload(name, tags, lines)).unwrap()
}

/// `count` recipes by `author` with one line of `amount` 1 of `ingredient`
/// each, all in `shopper`'s cart. Inserted set-wise in SQL so tens of
/// thousands of rows stay fast.
pub fn fill_cart(
    conn: &mut Connection,
    author: &User,
    shopper: &User,
    ingredient: &Ingredient,
    count: usize,
) {
    for statement in [
        format!(
            "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < {count}) \
             INSERT INTO recipes (author_id, name, image, cooking_time) \
             SELECT {}, 'Bulk ' || i, 'recipes/bulk.png', 10 FROM n",
            author.id
        ),
        format!(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) \
             SELECT id, {}, 1 FROM recipes WHERE author_id = {}",
            ingredient.id, author.id
        ),
        format!(
            "INSERT INTO cart_items (user_id, recipe_id) \
             SELECT {}, id FROM recipes WHERE author_id = {}",
            shopper.id, author.id
        ),
    ] {
        diesel::sql_query(statement).execute(conn).unwrap();
    }
}
