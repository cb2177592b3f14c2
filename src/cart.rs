// Copyright 2023 Remi Bernotavicius

//! Turning a shopping cart into a shopping list.

use crate::database;
use crate::database::models::{Ingredient, RecipeIngredient, UserId};
use crate::policy::{self, Actor};
use crate::Result;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use std::collections::BTreeMap;
use std::fmt;

pub const SHOPPING_LIST_FILE_NAME: &str = "shopping_list.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingListItem {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

impl fmt::Display for ShoppingListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) - {}", self.name, self.measurement_unit, self.amount)
    }
}

/// Sums amounts per (name, measurement unit). The map key ordering gives
/// the list its order: by name, then by unit.
pub fn aggregate<'a>(
    lines: impl IntoIterator<Item = (&'a Ingredient, i32)>,
) -> Vec<ShoppingListItem> {
    let mut totals: BTreeMap<(&str, &str), i64> = BTreeMap::new();
    for (ingredient, amount) in lines {
        *totals
            .entry((ingredient.name.as_str(), ingredient.measurement_unit.as_str()))
            .or_default() += i64::from(amount);
    }
    totals
        .into_iter()
        .map(|((name, measurement_unit), amount)| ShoppingListItem {
            name: name.into(),
            measurement_unit: measurement_unit.into(),
            amount,
        })
        .collect()
}

/// Every ingredient needed for the recipes in `user`'s cart, summed.
pub fn compute_shopping_list(
    conn: &mut database::Connection,
    user: UserId,
) -> Result<Vec<ShoppingListItem>> {
    use database::schema::{cart_items, ingredients, recipe_ingredients};

    let in_cart = cart_items::table
        .filter(cart_items::user_id.eq(user))
        .select(cart_items::recipe_id);
    let lines = recipe_ingredients::table
        .inner_join(ingredients::table)
        .filter(recipe_ingredients::recipe_id.eq_any(in_cart))
        .select((RecipeIngredient::as_select(), Ingredient::as_select()))
        .load::<(RecipeIngredient, Ingredient)>(conn)?;
    let items = aggregate(lines.iter().map(|(line, i)| (i, line.amount)));
    log::debug!(
        "shopping list for user {user}: {} line(s) into {} item(s)",
        lines.len(),
        items.len()
    );
    Ok(items)
}

/// The downloadable report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShoppingList {
    pub items: Vec<ShoppingListItem>,
}

impl fmt::Display for ShoppingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shopping list:")?;
        for item in &self.items {
            write!(f, "\n{item}")?;
        }
        Ok(())
    }
}

pub fn download_shopping_list(
    conn: &mut database::Connection,
    actor: &Actor,
) -> Result<ShoppingList> {
    let user = policy::require_active_user(actor, "download a shopping list")?;
    Ok(ShoppingList {
        items: compute_shopping_list(conn, user)?,
    })
}

#[cfg(test)]
use crate::relations::{self, Toggle};
#[cfg(test)]
use database::test_util;

#[cfg(test)]
fn item(name: &str, measurement_unit: &str, amount: i64) -> ShoppingListItem {
    ShoppingListItem {
        name: name.into(),
        measurement_unit: measurement_unit.into(),
        amount,
    }
}

#[test]
fn aggregate_groups_by_name_and_unit() {
    use crate::database::models::IngredientId;
    use maplit::btreemap;

    let ingredient = |id, name: &str, unit: &str| Ingredient {
        id: IngredientId(id),
        name: name.into(),
        measurement_unit: unit.into(),
    };
    let salt_g = ingredient(1, "salt", "g");
    let salt_pinch = ingredient(2, "salt", "pinch");
    let apples = ingredient(3, "apples", "pc");

    let items = aggregate([
        (&salt_g, 5),
        (&apples, 2),
        (&salt_pinch, 1),
        (&salt_g, 10),
        (&apples, i32::MAX),
    ]);
    let totals: BTreeMap<_, _> = items
        .iter()
        .map(|i| ((i.name.as_str(), i.measurement_unit.as_str()), i.amount))
        .collect();
    assert_eq!(
        totals,
        btreemap! {
            ("apples", "pc") => 2 + i64::from(i32::MAX),
            ("salt", "g") => 15,
            ("salt", "pinch") => 1,
        }
    );
    let order: Vec<_> = items.iter().map(|i| i.measurement_unit.as_str()).collect();
    assert_eq!(order, ["pc", "g", "pinch"]);

    assert!(aggregate(Vec::<(&Ingredient, i32)>::new()).is_empty());
}

#[test]
fn shopping_list_sums_across_cart() {
    let mut conn = test_util::connection();
    let author = test_util::user(&mut conn, "julia");
    let shopper = test_util::user(&mut conn, "jacques");
    let flour = test_util::ingredient(&mut conn, "Flour", "g");
    let egg = test_util::ingredient(&mut conn, "Egg", "pc");
    let milk = test_util::ingredient(&mut conn, "Milk", "ml");
    let breakfast = test_util::tag(&mut conn, "Breakfast", "#E26C2D", "breakfast");

    let first = test_util::recipe(
        &mut conn,
        &author,
        "Recipe1",
        &[&breakfast],
        &[(&flour, 200), (&egg, 2)],
    );
    let second = test_util::recipe(
        &mut conn,
        &author,
        "Recipe2",
        &[&breakfast],
        &[(&flour, 100), (&milk, 50)],
    );
    // Not in the cart, so it must not count.
    test_util::recipe(&mut conn, &author, "Recipe3", &[&breakfast], &[(&milk, 1000)]);

    let actor = Actor::from(&shopper);
    assert!(compute_shopping_list(&mut conn, shopper.id)
        .unwrap()
        .is_empty());

    relations::toggle_cart(&mut conn, &actor, first.id, Toggle::Add).unwrap();
    relations::toggle_cart(&mut conn, &actor, second.id, Toggle::Add).unwrap();

    assert_eq!(
        compute_shopping_list(&mut conn, shopper.id).unwrap(),
        vec![
            item("Egg", "pc", 2),
            item("Flour", "g", 300),
            item("Milk", "ml", 50),
        ]
    );
    // The author's own cart is untouched.
    assert!(compute_shopping_list(&mut conn, author.id)
        .unwrap()
        .is_empty());

    relations::toggle_cart(&mut conn, &actor, first.id, Toggle::Remove).unwrap();
    assert_eq!(
        compute_shopping_list(&mut conn, shopper.id).unwrap(),
        vec![item("Flour", "g", 100), item("Milk", "ml", 50)]
    );
}

#[test]
fn shopping_list_report() {
    let report = ShoppingList {
        items: vec![item("Egg", "pc", 2), item("Flour", "g", 300)],
    };
    assert_eq!(
        report.to_string(),
        "Shopping list:\nEgg (pc) - 2\nFlour (g) - 300"
    );
    assert_eq!(ShoppingList { items: vec![] }.to_string(), "Shopping list:");
}

#[test]
fn anonymous_cannot_download() {
    let mut conn = test_util::connection();
    assert!(matches!(
        download_shopping_list(&mut conn, &Actor::Anonymous),
        Err(crate::Error::Permission(_))
    ));

    let shopper = test_util::user(&mut conn, "jacques");
    let list = download_shopping_list(&mut conn, &Actor::from(&shopper)).unwrap();
    assert!(list.items.is_empty());
}

#[test]
fn shopping_list_for_a_very_large_cart() {
    let mut conn = test_util::connection();
    let author = test_util::user(&mut conn, "julia");
    let shopper = test_util::user(&mut conn, "jacques");
    let flour = test_util::ingredient(&mut conn, "Flour", "g");

    // More recipes than SQLite allows bound variables in one statement.
    test_util::fill_cart(&mut conn, &author, &shopper, &flour, 40_000);

    assert_eq!(
        compute_shopping_list(&mut conn, shopper.id).unwrap(),
        vec![item("Flour", "g", 40_000)]
    );
}
