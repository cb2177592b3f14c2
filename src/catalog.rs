// Copyright 2023 Remi Bernotavicius

//! Recipes, ingredients and tags.

use crate::database;
use crate::database::models::{
    Ingredient, IngredientId, NewIngredient, NewRecipe, NewRecipeIngredient, NewTag, Recipe,
    RecipeId, RecipeIngredient, RecipeTag, Tag, TagId, UserId,
};
use crate::error::QueryResultExt as _;
use crate::page::{Page, Pagination};
use crate::policy::{self, Action, Actor, Policy};
use crate::relations;
use crate::users::{self, UserProfile};
use crate::{Error, Result};
use diesel::prelude::Connection as _;
use diesel::sqlite::Sqlite;
use diesel::BelongingToDsl as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use std::collections::HashSet;

pub const MAX_NAME_LENGTH: usize = 256;
pub const MAX_SLUG_LENGTH: usize = 30;

/// Checks an already trimmed name.
fn validate_name(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::validation(field, "may not be blank"));
    }
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(Error::validation(
            field,
            format!("must be at most {MAX_NAME_LENGTH} characters"),
        ));
    }
    Ok(())
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct IngredientAmount {
    pub id: IngredientId,
    pub amount: i32,
}

/// Everything a client sends to create or overwrite a recipe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipePayload {
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
    pub tags: Vec<TagId>,
    pub ingredients: Vec<IngredientAmount>,
}

impl RecipePayload {
    fn validate(&self, conn: &mut database::Connection) -> Result<()> {
        validate_name("name", self.name.trim())?;
        if self.image.trim().is_empty() {
            return Err(Error::validation("image", "an image is required"));
        }
        if self.cooking_time < 1 {
            return Err(Error::validation(
                "cooking_time",
                "must be at least 1 minute",
            ));
        }
        self.validate_tags(conn)?;
        self.validate_ingredients(conn)
    }

    fn validate_tags(&self, conn: &mut database::Connection) -> Result<()> {
        use database::schema::tags::dsl::*;

        if self.tags.is_empty() {
            return Err(Error::validation("tags", "at least one tag is required"));
        }
        let mut seen = HashSet::new();
        for tag in &self.tags {
            if !seen.insert(*tag) {
                return Err(Error::validation(
                    "tags",
                    format!("tag {tag} is listed more than once"),
                ));
            }
        }

        let existing: HashSet<TagId> = tags
            .filter(id.eq_any(self.tags.clone()))
            .select(id)
            .load::<TagId>(conn)?
            .into_iter()
            .collect();
        if let Some(missing) = self.tags.iter().find(|t| !existing.contains(t)) {
            return Err(Error::validation(
                "tags",
                format!("tag {missing} does not exist"),
            ));
        }
        Ok(())
    }

    fn validate_ingredients(&self, conn: &mut database::Connection) -> Result<()> {
        use database::schema::ingredients::dsl::*;

        if self.ingredients.is_empty() {
            return Err(Error::validation(
                "ingredients",
                "at least one ingredient is required",
            ));
        }
        let mut seen = HashSet::new();
        for line in &self.ingredients {
            if !seen.insert(line.id) {
                return Err(Error::validation(
                    "ingredients",
                    format!("ingredient {} is listed more than once", line.id),
                ));
            }
            if line.amount < 1 {
                return Err(Error::validation(
                    "ingredients",
                    format!("amount of ingredient {} must be at least 1", line.id),
                ));
            }
        }

        let wanted: Vec<IngredientId> = self.ingredients.iter().map(|line| line.id).collect();
        let existing: HashSet<IngredientId> = ingredients
            .filter(id.eq_any(wanted))
            .select(id)
            .load::<IngredientId>(conn)?
            .into_iter()
            .collect();
        if let Some(missing) = self
            .ingredients
            .iter()
            .find(|line| !existing.contains(&line.id))
        {
            return Err(Error::validation(
                "ingredients",
                format!("ingredient {} does not exist", missing.id),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientLine {
    pub id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

/// A recipe as shown to one particular actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeDetail {
    pub recipe: Recipe,
    pub author: UserProfile,
    pub tags: Vec<Tag>,
    pub ingredients: Vec<IngredientLine>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<UserId>,
    /// Tag slugs; a recipe matches if it carries any of them.
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

pub(crate) fn load_recipe(conn: &mut database::Connection, recipe_id: RecipeId) -> Result<Recipe> {
    use database::schema::recipes::dsl::*;

    recipes
        .find(recipe_id)
        .select(Recipe::as_select())
        .get_result(conn)
        .or_not_found(format!("recipe {recipe_id}"))
}

fn attach_tags_and_ingredients(
    conn: &mut database::Connection,
    recipe: RecipeId,
    payload: &RecipePayload,
) -> Result<()> {
    use database::schema::{recipe_ingredients, recipe_tags};

    let links: Vec<RecipeTag> = payload
        .tags
        .iter()
        .map(|&tag_id| RecipeTag {
            recipe_id: recipe,
            tag_id,
        })
        .collect();
    diesel::insert_into(recipe_tags::table)
        .values(&links)
        .execute(conn)?;

    let lines: Vec<NewRecipeIngredient> = payload
        .ingredients
        .iter()
        .map(|line| NewRecipeIngredient {
            recipe_id: recipe,
            ingredient_id: line.id,
            amount: line.amount,
        })
        .collect();
    diesel::insert_into(recipe_ingredients::table)
        .values(&lines)
        .execute(conn)
        .or_duplicate(format!("ingredient line of recipe {recipe}"))?;
    Ok(())
}

pub fn create_recipe(
    conn: &mut database::Connection,
    actor: &Actor,
    payload: &RecipePayload,
) -> Result<Recipe> {
    use database::schema::recipes;

    let author = policy::require_active_user(actor, "publish recipes")?;

    conn.transaction(|conn| {
        payload.validate(conn)?;
        let recipe = diesel::insert_into(recipes::table)
            .values(NewRecipe {
                author_id: author,
                name: payload.name.trim(),
                image: &payload.image,
                text: &payload.text,
                cooking_time: payload.cooking_time,
                created_at: chrono::Utc::now().naive_utc(),
            })
            .returning(Recipe::as_returning())
            .get_result(conn)?;
        attach_tags_and_ingredients(conn, recipe.id, payload)?;
        log::info!("user {author} published recipe {} {:?}", recipe.id, recipe.name);
        Ok(recipe)
    })
}

/// Overwrites the recipe with `payload`. The old tag set and ingredient
/// lines are dropped and rebuilt, never merged.
pub fn update_recipe(
    conn: &mut database::Connection,
    actor: &Actor,
    recipe_id: RecipeId,
    payload: &RecipePayload,
) -> Result<Recipe> {
    use database::schema::{recipe_ingredients, recipe_tags, recipes};

    conn.transaction(|conn| {
        let recipe = load_recipe(conn, recipe_id)?;
        policy::check_access(Policy::OwnerOrStaff, Action::Write, actor, &recipe)
            .ensure("edit this recipe")?;
        payload.validate(conn)?;

        diesel::delete(recipe_tags::table.filter(recipe_tags::recipe_id.eq(recipe.id)))
            .execute(conn)?;
        diesel::delete(
            recipe_ingredients::table.filter(recipe_ingredients::recipe_id.eq(recipe.id)),
        )
        .execute(conn)?;

        let recipe = diesel::update(&recipe)
            .set((
                recipes::name.eq(payload.name.trim()),
                recipes::image.eq(&payload.image),
                recipes::text.eq(&payload.text),
                recipes::cooking_time.eq(payload.cooking_time),
            ))
            .returning(Recipe::as_returning())
            .get_result(conn)?;
        attach_tags_and_ingredients(conn, recipe.id, payload)?;
        log::info!("recipe {} {:?} updated", recipe.id, recipe.name);
        Ok(recipe)
    })
}

pub fn delete_recipe(
    conn: &mut database::Connection,
    actor: &Actor,
    recipe_id: RecipeId,
) -> Result<()> {
    conn.transaction(|conn| {
        let recipe = load_recipe(conn, recipe_id)?;
        policy::check_access(Policy::OwnerOrStaff, Action::Write, actor, &recipe)
            .ensure("delete this recipe")?;
        diesel::delete(&recipe).execute(conn)?;
        log::info!("recipe {} {:?} deleted", recipe.id, recipe.name);
        Ok(())
    })
}

fn recipe_detail(
    conn: &mut database::Connection,
    actor: &Actor,
    recipe: Recipe,
) -> Result<RecipeDetail> {
    use database::schema::{ingredients, recipe_ingredients, tags};

    let author = users::get_user(conn, actor, recipe.author_id)?;
    let recipe_tags = RecipeTag::belonging_to(&recipe)
        .inner_join(tags::table)
        .select(Tag::as_select())
        .order_by(tags::name.asc())
        .load(conn)?;
    let lines = RecipeIngredient::belonging_to(&recipe)
        .inner_join(ingredients::table)
        .select((RecipeIngredient::as_select(), Ingredient::as_select()))
        .order_by(recipe_ingredients::id.asc())
        .load::<(RecipeIngredient, Ingredient)>(conn)?
        .into_iter()
        .map(|(line, ingredient)| IngredientLine {
            id: ingredient.id,
            name: ingredient.name,
            measurement_unit: ingredient.measurement_unit,
            amount: line.amount,
        })
        .collect();
    let is_favorited = relations::is_favorited(conn, actor, recipe.id)?;
    let is_in_shopping_cart = relations::is_in_cart(conn, actor, recipe.id)?;

    Ok(RecipeDetail {
        recipe,
        author,
        tags: recipe_tags,
        ingredients: lines,
        is_favorited,
        is_in_shopping_cart,
    })
}

pub fn get_recipe(
    conn: &mut database::Connection,
    actor: &Actor,
    recipe_id: RecipeId,
) -> Result<RecipeDetail> {
    let recipe = load_recipe(conn, recipe_id)?;
    recipe_detail(conn, actor, recipe)
}

/// Recipes matching `filter`, unordered. The favorite and cart filters only
/// apply when there is a signed-in user `me`.
fn filtered_recipes(
    me: Option<UserId>,
    filter: &RecipeFilter,
) -> database::schema::recipes::BoxedQuery<'static, Sqlite> {
    use database::schema::{cart_items, favorites, recipe_tags, recipes, tags};

    let mut query = recipes::table.into_boxed();
    if let Some(author) = filter.author {
        query = query.filter(recipes::author_id.eq(author));
    }
    if !filter.tags.is_empty() {
        let tag_ids = tags::table
            .filter(tags::slug.eq_any(filter.tags.clone()))
            .select(tags::id);
        query = query.filter(
            recipes::id.eq_any(
                recipe_tags::table
                    .filter(recipe_tags::tag_id.eq_any(tag_ids))
                    .select(recipe_tags::recipe_id),
            ),
        );
    }
    if let Some(me) = me {
        if filter.is_favorited {
            query = query.filter(
                recipes::id.eq_any(
                    favorites::table
                        .filter(favorites::user_id.eq(me))
                        .select(favorites::recipe_id),
                ),
            );
        }
        if filter.is_in_shopping_cart {
            query = query.filter(
                recipes::id.eq_any(
                    cart_items::table
                        .filter(cart_items::user_id.eq(me))
                        .select(cart_items::recipe_id),
                ),
            );
        }
    }
    query
}

/// Newest recipes first, narrowed by `filter`. Asking for favorites or cart
/// contents without being signed in matches nothing.
pub fn list_recipes(
    conn: &mut database::Connection,
    actor: &Actor,
    filter: &RecipeFilter,
    pagination: Pagination,
) -> Result<Page<RecipeDetail>> {
    use database::schema::recipes;

    let me = actor.user_id();
    if me.is_none() && (filter.is_favorited || filter.is_in_shopping_cart) {
        return Ok(Page::empty());
    }

    let total: i64 = filtered_recipes(me, filter).count().get_result(conn)?;
    let window: Vec<RecipeId> = filtered_recipes(me, filter)
        .select(recipes::id)
        .order_by((recipes::created_at.desc(), recipes::id.desc()))
        .limit(pagination.sql_limit())
        .offset(pagination.sql_offset())
        .load(conn)?;
    log::debug!("{total} recipe(s) match {filter:?}");
    Page::new(total, window).try_map(|recipe_id| get_recipe(conn, actor, recipe_id))
}

pub fn list_ingredients(
    conn: &mut database::Connection,
    name_prefix: Option<&str>,
) -> Result<Vec<Ingredient>> {
    use database::schema::ingredients::dsl::*;
    use diesel::expression_methods::EscapeExpressionMethods as _;
    use diesel::expression_methods::TextExpressionMethods as _;

    let mut query = ingredients
        .select(Ingredient::as_select())
        .order_by((name.asc(), measurement_unit.asc()))
        .into_boxed();
    if let Some(prefix) = name_prefix.filter(|p| !p.is_empty()) {
        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        query = query.filter(name.like(format!("{escaped}%")).escape('\\'));
    }
    Ok(query.load(conn)?)
}

pub fn get_ingredient(
    conn: &mut database::Connection,
    ingredient_id: IngredientId,
) -> Result<Ingredient> {
    use database::schema::ingredients::dsl::*;

    ingredients
        .find(ingredient_id)
        .select(Ingredient::as_select())
        .get_result(conn)
        .or_not_found(format!("ingredient {ingredient_id}"))
}

/// Trims both fields and checks them the way [`create_ingredient`] does.
pub(crate) fn normalize_ingredient(new_ingredient: NewIngredient) -> Result<NewIngredient> {
    let normalized = NewIngredient {
        name: new_ingredient.name.trim().to_owned(),
        measurement_unit: new_ingredient.measurement_unit.trim().to_owned(),
    };
    validate_name("name", &normalized.name)?;
    validate_name("measurement_unit", &normalized.measurement_unit)?;
    Ok(normalized)
}

pub fn create_ingredient(
    conn: &mut database::Connection,
    actor: &Actor,
    new_ingredient: &NewIngredient,
) -> Result<Ingredient> {
    use database::schema::ingredients::dsl::*;

    policy::admin_only(Action::Write, actor).ensure("manage ingredients")?;
    let new_ingredient = normalize_ingredient(new_ingredient.clone())?;

    let what = format!(
        "ingredient {:?} ({})",
        new_ingredient.name, new_ingredient.measurement_unit
    );
    conn.transaction(|conn| {
        let exists: bool = diesel::select(diesel::dsl::exists(
            ingredients
                .filter(name.eq(&new_ingredient.name))
                .filter(measurement_unit.eq(&new_ingredient.measurement_unit)),
        ))
        .get_result(conn)?;
        if exists {
            return Err(Error::Duplicate(what.clone()));
        }
        let ingredient = diesel::insert_into(ingredients)
            .values(&new_ingredient)
            .returning(Ingredient::as_returning())
            .get_result(conn)
            .or_duplicate(&what)?;
        log::info!("added {what} as {}", ingredient.id);
        Ok(ingredient)
    })
}

/// Accepts `#RGB` or `#RRGGBB` and returns it upper-cased.
pub fn normalize_color(color: &str) -> Result<String> {
    let color = color.trim();
    let valid = match color.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    };
    if !valid {
        return Err(Error::validation(
            "color",
            format!("{color:?} is not a #RGB or #RRGGBB color"),
        ));
    }
    Ok(color.to_ascii_uppercase())
}

fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.chars().count() > MAX_SLUG_LENGTH {
        return Err(Error::validation(
            "slug",
            format!("must be between 1 and {MAX_SLUG_LENGTH} characters"),
        ));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::validation(
            "slug",
            "may only contain letters, digits, hyphens and underscores",
        ));
    }
    Ok(())
}

pub fn list_tags(conn: &mut database::Connection) -> Result<Vec<Tag>> {
    use database::schema::tags::dsl::*;

    Ok(tags
        .select(Tag::as_select())
        .order_by(name.asc())
        .load(conn)?)
}

pub fn get_tag(conn: &mut database::Connection, tag_id: TagId) -> Result<Tag> {
    use database::schema::tags::dsl::*;

    tags.find(tag_id)
        .select(Tag::as_select())
        .get_result(conn)
        .or_not_found(format!("tag {tag_id}"))
}

pub fn create_tag(
    conn: &mut database::Connection,
    actor: &Actor,
    new_tag: &NewTag,
) -> Result<Tag> {
    use database::schema::tags::dsl::*;

    policy::admin_only(Action::Write, actor).ensure("manage tags")?;
    let new_tag = NewTag {
        name: new_tag.name.trim().to_owned(),
        color: new_tag.color.clone(),
        slug: new_tag.slug.trim().to_owned(),
    };
    validate_name("name", &new_tag.name)?;
    validate_slug(&new_tag.slug)?;
    let new_tag = NewTag {
        color: normalize_color(&new_tag.color)?,
        ..new_tag
    };

    conn.transaction(|conn| {
        let collisions: [(&str, bool); 3] = [
            (
                "name",
                diesel::select(diesel::dsl::exists(tags.filter(name.eq(&new_tag.name))))
                    .get_result(conn)?,
            ),
            (
                "color",
                diesel::select(diesel::dsl::exists(tags.filter(color.eq(&new_tag.color))))
                    .get_result(conn)?,
            ),
            (
                "slug",
                diesel::select(diesel::dsl::exists(tags.filter(slug.eq(&new_tag.slug))))
                    .get_result(conn)?,
            ),
        ];
        if let Some((field, _)) = collisions.iter().find(|(_, taken)| *taken) {
            return Err(Error::Duplicate(format!("tag with this {field}")));
        }
        let tag = diesel::insert_into(tags)
            .values(&new_tag)
            .returning(Tag::as_returning())
            .get_result(conn)
            .or_duplicate(format!("tag {:?}", new_tag.name))?;
        log::info!("added tag {:?} as {}", tag.name, tag.id);
        Ok(tag)
    })
}

pub fn delete_tag(conn: &mut database::Connection, actor: &Actor, tag_id: TagId) -> Result<()> {
    conn.transaction(|conn| {
        let tag = get_tag(conn, tag_id)?;
        policy::check_access(Policy::AdminOnly, Action::Write, actor, &tag)
            .ensure("manage tags")?;
        diesel::delete(&tag).execute(conn)?;
        log::info!("deleted tag {:?}", tag.name);
        Ok(())
    })
}

#[cfg(test)]
use crate::database::models::User;
#[cfg(test)]
use database::test_util;

#[cfg(test)]
struct Pantry {
    author: User,
    flour: Ingredient,
    sugar: Ingredient,
    egg: Ingredient,
    breakfast: Tag,
    dinner: Tag,
}

#[cfg(test)]
impl Pantry {
    fn stock(conn: &mut database::Connection) -> Self {
        Self {
            author: test_util::user(conn, "julia"),
            flour: test_util::ingredient(conn, "Flour", "g"),
            sugar: test_util::ingredient(conn, "Sugar", "g"),
            egg: test_util::ingredient(conn, "Egg", "pc"),
            breakfast: test_util::tag(conn, "Breakfast", "#E26C2D", "breakfast"),
            dinner: test_util::tag(conn, "Dinner", "#49B64E", "dinner"),
        }
    }

    fn actor(&self) -> Actor {
        Actor::from(&self.author)
    }
}

#[cfg(test)]
fn recipe_count(conn: &mut database::Connection) -> i64 {
    database::schema::recipes::table
        .count()
        .get_result(conn)
        .unwrap()
}

#[cfg(test)]
fn assert_invalid(result: Result<Recipe>, expected_field: &str) {
    match result {
        Err(Error::Validation { field, .. }) => assert_eq!(field, expected_field),
        other => panic!("expected invalid {expected_field}, got {other:?}"),
    }
}

#[test]
fn create_and_read_recipe() {
    let mut conn = test_util::connection();
    let p = Pantry::stock(&mut conn);

    let payload = test_util::payload(
        "Pancakes",
        &[&p.dinner, &p.breakfast],
        &[(&p.flour, 200), (&p.egg, 2)],
    );
    let recipe = create_recipe(&mut conn, &p.actor(), &payload).unwrap();
    assert_eq!(recipe.author_id, p.author.id);
    assert_eq!(recipe.cooking_time, 30);

    let detail = get_recipe(&mut conn, &Actor::Anonymous, recipe.id).unwrap();
    assert_eq!(detail.recipe, recipe);
    assert_eq!(detail.author.user, p.author);
    let tag_names: Vec<_> = detail.tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tag_names, ["Breakfast", "Dinner"]);
    assert_eq!(
        detail.ingredients,
        vec![
            IngredientLine {
                id: p.flour.id,
                name: "Flour".into(),
                measurement_unit: "g".into(),
                amount: 200,
            },
            IngredientLine {
                id: p.egg.id,
                name: "Egg".into(),
                measurement_unit: "pc".into(),
                amount: 2,
            },
        ]
    );
    assert!(!detail.is_favorited);
    assert!(!detail.is_in_shopping_cart);
}

#[test]
fn invalid_recipes_are_rejected_whole() {
    let mut conn = test_util::connection();
    let p = Pantry::stock(&mut conn);
    let actor = p.actor();
    let valid = test_util::payload("Cake", &[&p.breakfast], &[(&p.flour, 300)]);

    let mut payload = valid.clone();
    payload.ingredients.clear();
    assert_invalid(create_recipe(&mut conn, &actor, &payload), "ingredients");

    let mut payload = valid.clone();
    payload.ingredients.push(IngredientAmount {
        id: p.flour.id,
        amount: 10,
    });
    assert_invalid(create_recipe(&mut conn, &actor, &payload), "ingredients");

    let mut payload = valid.clone();
    payload.ingredients[0].amount = 0;
    assert_invalid(create_recipe(&mut conn, &actor, &payload), "ingredients");

    let mut payload = valid.clone();
    payload.ingredients.push(IngredientAmount {
        id: IngredientId(999),
        amount: 1,
    });
    assert_invalid(create_recipe(&mut conn, &actor, &payload), "ingredients");

    let mut payload = valid.clone();
    payload.tags.clear();
    assert_invalid(create_recipe(&mut conn, &actor, &payload), "tags");

    let mut payload = valid.clone();
    payload.tags.push(TagId(999));
    assert_invalid(create_recipe(&mut conn, &actor, &payload), "tags");

    let mut payload = valid.clone();
    payload.tags.push(p.breakfast.id);
    assert_invalid(create_recipe(&mut conn, &actor, &payload), "tags");

    let mut payload = valid.clone();
    payload.cooking_time = 0;
    assert_invalid(create_recipe(&mut conn, &actor, &payload), "cooking_time");

    let mut payload = valid.clone();
    payload.name = "   ".into();
    assert_invalid(create_recipe(&mut conn, &actor, &payload), "name");

    let mut payload = valid;
    payload.image.clear();
    assert_invalid(create_recipe(&mut conn, &actor, &payload), "image");

    assert_eq!(recipe_count(&mut conn), 0);
}

#[test]
fn anonymous_cannot_publish() {
    let mut conn = test_util::connection();
    let p = Pantry::stock(&mut conn);
    let payload = test_util::payload("Cake", &[&p.breakfast], &[(&p.flour, 300)]);

    assert!(matches!(
        create_recipe(&mut conn, &Actor::Anonymous, &payload),
        Err(Error::Permission(_))
    ));
    assert_eq!(recipe_count(&mut conn), 0);
}

#[test]
fn update_replaces_ingredients_and_tags() {
    let mut conn = test_util::connection();
    let p = Pantry::stock(&mut conn);
    let recipe = test_util::recipe(
        &mut conn,
        &p.author,
        "Cake",
        &[&p.breakfast],
        &[(&p.flour, 200)],
    );

    let mut payload = test_util::payload("Sweet cake", &[&p.dinner], &[(&p.sugar, 50)]);
    payload.cooking_time = 45;
    let updated = update_recipe(&mut conn, &p.actor(), recipe.id, &payload).unwrap();
    assert_eq!(updated.id, recipe.id);
    assert_eq!(updated.name, "Sweet cake");
    assert_eq!(updated.cooking_time, 45);
    assert_eq!(updated.created_at, recipe.created_at);

    let detail = get_recipe(&mut conn, &p.actor(), recipe.id).unwrap();
    let lines: Vec<_> = detail
        .ingredients
        .iter()
        .map(|l| (l.name.as_str(), l.amount))
        .collect();
    assert_eq!(lines, [("Sugar", 50)]);
    let tag_slugs: Vec<_> = detail.tags.iter().map(|t| t.slug.as_str()).collect();
    assert_eq!(tag_slugs, ["dinner"]);
}

#[test]
fn failed_update_keeps_the_old_recipe() {
    let mut conn = test_util::connection();
    let p = Pantry::stock(&mut conn);
    let recipe = test_util::recipe(
        &mut conn,
        &p.author,
        "Cake",
        &[&p.breakfast],
        &[(&p.flour, 200)],
    );

    let mut payload = test_util::payload("Cake", &[&p.breakfast], &[(&p.sugar, 50)]);
    payload.tags.push(TagId(999));
    assert_invalid(
        update_recipe(&mut conn, &p.actor(), recipe.id, &payload),
        "tags",
    );

    let detail = get_recipe(&mut conn, &p.actor(), recipe.id).unwrap();
    assert_eq!(detail.ingredients.len(), 1);
    assert_eq!(detail.ingredients[0].name, "Flour");
}

#[test]
fn only_author_or_staff_edit_recipes() {
    let mut conn = test_util::connection();
    let p = Pantry::stock(&mut conn);
    let stranger = test_util::user(&mut conn, "stranger");
    let admin = test_util::staff(&mut conn, "admin");
    let recipe = test_util::recipe(
        &mut conn,
        &p.author,
        "Cake",
        &[&p.breakfast],
        &[(&p.flour, 200)],
    );
    let payload = test_util::payload("Pie", &[&p.breakfast], &[(&p.flour, 250)]);

    assert!(matches!(
        update_recipe(&mut conn, &Actor::from(&stranger), recipe.id, &payload),
        Err(Error::Permission(_))
    ));
    assert!(matches!(
        delete_recipe(&mut conn, &Actor::from(&stranger), recipe.id),
        Err(Error::Permission(_))
    ));
    update_recipe(&mut conn, &Actor::from(&admin), recipe.id, &payload).unwrap();
    assert!(matches!(
        update_recipe(&mut conn, &p.actor(), RecipeId(999), &payload),
        Err(Error::NotFound(_))
    ));

    delete_recipe(&mut conn, &p.actor(), recipe.id).unwrap();
    assert!(matches!(
        get_recipe(&mut conn, &p.actor(), recipe.id),
        Err(Error::NotFound(_))
    ));
    let orphans: i64 = database::schema::recipe_ingredients::table
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(orphans, 0);
}

#[test]
fn list_recipes_filters() {
    use relations::Toggle;

    let mut conn = test_util::connection();
    let p = Pantry::stock(&mut conn);
    let other = test_util::user(&mut conn, "jacques");
    let pancakes = test_util::recipe(
        &mut conn,
        &p.author,
        "Pancakes",
        &[&p.breakfast],
        &[(&p.flour, 200)],
    );
    let roast = test_util::recipe(&mut conn, &other, "Roast", &[&p.dinner], &[(&p.egg, 1)]);
    let omelette = test_util::recipe(
        &mut conn,
        &other,
        "Omelette",
        &[&p.breakfast, &p.dinner],
        &[(&p.egg, 3)],
    );
    let ids = |page: Page<RecipeDetail>| -> Vec<RecipeId> {
        page.results.into_iter().map(|d| d.recipe.id).collect()
    };

    let all = list_recipes(
        &mut conn,
        &Actor::Anonymous,
        &RecipeFilter::default(),
        Pagination::default(),
    )
    .unwrap();
    assert_eq!(all.count, 3);
    assert_eq!(ids(all), [omelette.id, roast.id, pancakes.id]);

    let by_author = RecipeFilter {
        author: Some(other.id),
        ..Default::default()
    };
    let page = list_recipes(&mut conn, &Actor::Anonymous, &by_author, Pagination::new(1, 1))
        .unwrap();
    assert_eq!(page.count, 2);
    assert_eq!(ids(page), [roast.id]);

    let breakfast = RecipeFilter {
        tags: vec!["breakfast".into()],
        ..Default::default()
    };
    let page =
        list_recipes(&mut conn, &Actor::Anonymous, &breakfast, Pagination::default()).unwrap();
    assert_eq!(ids(page), [omelette.id, pancakes.id]);

    let actor = p.actor();
    relations::toggle_favorite(&mut conn, &actor, roast.id, Toggle::Add).unwrap();
    relations::toggle_cart(&mut conn, &actor, omelette.id, Toggle::Add).unwrap();
    relations::toggle_favorite(&mut conn, &actor, omelette.id, Toggle::Add).unwrap();

    let favorited = RecipeFilter {
        is_favorited: true,
        ..Default::default()
    };
    let page = list_recipes(&mut conn, &actor, &favorited, Pagination::default()).unwrap();
    assert_eq!(ids(page), [omelette.id, roast.id]);

    let in_cart_for_breakfast = RecipeFilter {
        is_in_shopping_cart: true,
        tags: vec!["breakfast".into()],
        ..Default::default()
    };
    let page =
        list_recipes(&mut conn, &actor, &in_cart_for_breakfast, Pagination::default()).unwrap();
    assert_eq!(page.count, 1);
    assert!(page.results[0].is_in_shopping_cart);
    assert!(page.results[0].is_favorited);

    let page =
        list_recipes(&mut conn, &Actor::Anonymous, &favorited, Pagination::default()).unwrap();
    assert_eq!(page, Page::empty());
}

#[test]
fn ingredients_are_admin_managed() {
    let mut conn = test_util::connection();
    let p = Pantry::stock(&mut conn);
    let admin = test_util::staff(&mut conn, "admin");
    let milk = NewIngredient {
        name: "Milk".into(),
        measurement_unit: "ml".into(),
    };

    assert!(matches!(
        create_ingredient(&mut conn, &p.actor(), &milk),
        Err(Error::Permission(_))
    ));
    let created = create_ingredient(&mut conn, &Actor::from(&admin), &milk).unwrap();
    assert_eq!(get_ingredient(&mut conn, created.id).unwrap(), created);
    assert!(matches!(
        create_ingredient(&mut conn, &Actor::from(&admin), &milk),
        Err(Error::Duplicate(_))
    ));

    // Same name, different unit is a different ingredient.
    let milk_in_cups = NewIngredient {
        measurement_unit: "cup".into(),
        ..milk
    };
    create_ingredient(&mut conn, &Actor::from(&admin), &milk_in_cups).unwrap();

    let names: Vec<_> = list_ingredients(&mut conn, None)
        .unwrap()
        .into_iter()
        .map(|i| format!("{} ({})", i.name, i.measurement_unit))
        .collect();
    assert_eq!(
        names,
        ["Egg (pc)", "Flour (g)", "Milk (cup)", "Milk (ml)", "Sugar (g)"]
    );
    let matching: Vec<_> = list_ingredients(&mut conn, Some("mi"))
        .unwrap()
        .into_iter()
        .map(|i| i.measurement_unit)
        .collect();
    assert_eq!(matching, ["cup", "ml"]);
}

#[test]
fn tag_rules() {
    let mut conn = test_util::connection();
    let p = Pantry::stock(&mut conn);
    let admin = Actor::from(&test_util::staff(&mut conn, "admin"));

    assert_eq!(normalize_color("#abc").unwrap(), "#ABC");
    assert_eq!(normalize_color(" #a1b2c3 ").unwrap(), "#A1B2C3");
    for bad in ["abc", "#abcd", "#ggg", ""] {
        assert!(normalize_color(bad).is_err(), "{bad:?} accepted");
    }

    let lunch = NewTag {
        name: "Lunch".into(),
        color: "#00ff00".into(),
        slug: "lunch".into(),
    };
    assert!(matches!(
        create_tag(&mut conn, &p.actor(), &lunch),
        Err(Error::Permission(_))
    ));
    let tag = create_tag(&mut conn, &admin, &lunch).unwrap();
    assert_eq!(tag.color, "#00FF00");

    let same_color = NewTag {
        name: "Brunch".into(),
        color: "#00FF00".into(),
        slug: "brunch".into(),
    };
    assert!(matches!(
        create_tag(&mut conn, &admin, &same_color),
        Err(Error::Duplicate(what)) if what == "tag with this color"
    ));
    let bad_slug = NewTag {
        slug: "brunch time".into(),
        ..same_color
    };
    assert!(matches!(
        create_tag(&mut conn, &admin, &bad_slug),
        Err(Error::Validation { field: "slug", .. })
    ));

    let names: Vec<_> = list_tags(&mut conn)
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, ["Breakfast", "Dinner", "Lunch"]);

    delete_tag(&mut conn, &admin, tag.id).unwrap();
    assert!(matches!(get_tag(&mut conn, tag.id), Err(Error::NotFound(_))));
}

#[test]
fn list_recipes_over_a_very_large_cart() {
    let mut conn = test_util::connection();
    let p = Pantry::stock(&mut conn);
    let shopper = test_util::user(&mut conn, "jacques");
    test_util::fill_cart(&mut conn, &p.author, &shopper, &p.flour, 40_000);
    diesel::sql_query(format!(
        "INSERT INTO favorites (user_id, recipe_id) SELECT {}, recipe_id FROM cart_items",
        shopper.id
    ))
    .execute(&mut conn)
    .unwrap();

    let actor = Actor::from(&shopper);
    let in_cart = RecipeFilter {
        is_in_shopping_cart: true,
        ..Default::default()
    };
    let page = list_recipes(&mut conn, &actor, &in_cart, Pagination::new(2, 39_999)).unwrap();
    assert_eq!(page.count, 40_000);
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0].recipe.name, "Bulk 1");

    let favorite_and_in_cart = RecipeFilter {
        is_favorited: true,
        is_in_shopping_cart: true,
        author: Some(p.author.id),
        ..Default::default()
    };
    let page = list_recipes(
        &mut conn,
        &actor,
        &favorite_and_in_cart,
        Pagination::new(1, 0),
    )
    .unwrap();
    assert_eq!(page.count, 40_000);
    assert_eq!(page.results[0].recipe.name, "Bulk 40000");
    assert!(page.results[0].is_favorited);
}

#[test]
fn names_are_trimmed_before_checks() {
    let mut conn = test_util::connection();
    let p = Pantry::stock(&mut conn);
    let admin = Actor::from(&test_util::staff(&mut conn, "admin"));

    let padded = NewIngredient {
        name: " Flour ".into(),
        measurement_unit: "g ".into(),
    };
    assert!(matches!(
        create_ingredient(&mut conn, &admin, &padded),
        Err(Error::Duplicate(_))
    ));
    let blank_unit = NewIngredient {
        name: "Salt".into(),
        measurement_unit: "  ".into(),
    };
    assert!(matches!(
        create_ingredient(&mut conn, &admin, &blank_unit),
        Err(Error::Validation {
            field: "measurement_unit",
            ..
        })
    ));

    let longest = "x".repeat(MAX_NAME_LENGTH);
    let payload = test_util::payload(&format!("  {longest}  "), &[&p.breakfast], &[(&p.flour, 1)]);
    let recipe = create_recipe(&mut conn, &p.actor(), &payload).unwrap();
    assert_eq!(recipe.name, longest);

    let tag = create_tag(
        &mut conn,
        &admin,
        &NewTag {
            name: " Lunch ".into(),
            color: "#123".into(),
            slug: "lunch".into(),
        },
    )
    .unwrap();
    assert_eq!(tag.name, "Lunch");
    assert!(matches!(
        create_tag(
            &mut conn,
            &admin,
            &NewTag {
                name: "Lunch".into(),
                color: "#456".into(),
                slug: "lunch-2".into(),
            },
        ),
        Err(Error::Duplicate(what)) if what == "tag with this name"
    ));
}
