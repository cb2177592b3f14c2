// Copyright 2023 Remi Bernotavicius

//! Bulk loading of the ingredient catalog from a JSON dump of
//! `{"name": ..., "measurement_unit": ...}` objects.

use crate::catalog;
use crate::database;
use crate::database::models::NewIngredient;
use crate::{Error, Result};
use diesel::prelude::Connection as _;
use diesel::RunQueryDsl as _;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

const BATCH_SIZE: usize = 50;

pub struct IngredientImporter {
    remaining: Vec<NewIngredient>,

    num_imported: usize,
    num_skipped: usize,
    total_num_ingredients: usize,
}

impl IngredientImporter {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let ingredients: Vec<NewIngredient> = serde_json::from_reader(BufReader::new(file))?;
        Self::from_ingredients(ingredients)
    }

    /// Rejects the whole input if any entry would fail catalog validation.
    pub fn from_ingredients(ingredients: Vec<NewIngredient>) -> Result<Self> {
        let mut ingredients = ingredients
            .into_iter()
            .map(catalog::normalize_ingredient)
            .collect::<Result<Vec<_>>>()?;
        // Batches are taken off the end.
        ingredients.reverse();
        Ok(Self {
            total_num_ingredients: ingredients.len(),
            remaining: ingredients,
            num_imported: 0,
            num_skipped: 0,
        })
    }

    pub fn done(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn num_imported(&self) -> usize {
        self.num_imported
    }

    /// Entries that were already in the catalog.
    pub fn num_skipped(&self) -> usize {
        self.num_skipped
    }

    pub fn percent_done(&self) -> f32 {
        if self.total_num_ingredients == 0 {
            return 1.0;
        }
        (self.num_imported + self.num_skipped) as f32 / self.total_num_ingredients as f32
    }

    pub fn import_one(&mut self, conn: &mut database::Connection) -> Result<()> {
        use database::schema::ingredients::dsl::*;

        if self.done() {
            return Ok(());
        }

        let split_point = self.remaining.len().saturating_sub(BATCH_SIZE);
        let batch = self.remaining.split_off(split_point);

        let inserted = conn.transaction(|conn| {
            let mut inserted = 0;
            for ingredient in batch.iter().rev() {
                inserted += diesel::insert_into(ingredients)
                    .values(ingredient)
                    .on_conflict_do_nothing()
                    .execute(conn)?;
            }
            Ok::<_, Error>(inserted)
        })?;

        self.num_imported += inserted;
        self.num_skipped += batch.len() - inserted;
        Ok(())
    }
}

pub fn import_ingredients(
    conn: &mut database::Connection,
    path: impl AsRef<Path>,
) -> Result<IngredientImporter> {
    let path = path.as_ref();
    let mut importer = IngredientImporter::new(path)?;
    log::info!(
        "importing {} ingredient(s) from {}",
        importer.total_num_ingredients,
        path.display()
    );

    while !importer.done() {
        importer.import_one(conn)?;
        log::info!("imported {:.0}%", importer.percent_done() * 100.0);
    }

    log::info!(
        "added {} ingredient(s), {} already present",
        importer.num_imported(),
        importer.num_skipped()
    );
    Ok(importer)
}

#[cfg(test)]
use database::test_util;

#[cfg(test)]
fn new_ingredient(name: &str, measurement_unit: &str) -> NewIngredient {
    NewIngredient {
        name: name.into(),
        measurement_unit: measurement_unit.into(),
    }
}

#[test]
fn import_skips_existing_pairs() {
    use diesel::QueryDsl as _;

    let mut conn = test_util::connection();
    test_util::ingredient(&mut conn, "Flour", "g");

    let mut input: Vec<_> = (0..120)
        .map(|i| new_ingredient(&format!("spice {i}"), "g"))
        .collect();
    input.push(new_ingredient("Flour", "g"));
    input.push(new_ingredient("Flour", "kg"));
    input.push(new_ingredient(" Flour ", "kg"));

    let mut importer = IngredientImporter::from_ingredients(input).unwrap();
    let mut batches = 0;
    while !importer.done() {
        importer.import_one(&mut conn).unwrap();
        batches += 1;
    }
    assert_eq!(batches, 3);
    assert_eq!(importer.num_imported(), 121);
    assert_eq!(importer.num_skipped(), 2);
    assert_eq!(importer.percent_done(), 1.0);
    importer.import_one(&mut conn).unwrap();
    assert_eq!(importer.num_imported(), 121);

    let count: i64 = database::schema::ingredients::table
        .count()
        .get_result(&mut conn)
        .unwrap();
    assert_eq!(count, 122);
}

#[test]
fn import_from_json_file() {
    let path = std::env::temp_dir().join(format!("foodgram-import-{}.json", std::process::id()));
    std::fs::write(
        &path,
        r#"[
            {"name": "Sugar", "measurement_unit": "g"},
            {"name": "Milk", "measurement_unit": "ml"}
        ]"#,
    )
    .unwrap();

    let mut conn = test_util::connection();
    let importer = import_ingredients(&mut conn, &path).unwrap();
    assert_eq!(importer.num_imported(), 2);

    let again = import_ingredients(&mut conn, &path).unwrap();
    assert_eq!(again.num_imported(), 0);
    assert_eq!(again.num_skipped(), 2);

    let names: Vec<_> = catalog::list_ingredients(&mut conn, None)
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, ["Milk", "Sugar"]);

    std::fs::write(&path, r#"[{"name": "Salt"}]"#).unwrap();
    assert!(matches!(
        import_ingredients(&mut conn, &path),
        Err(Error::Json(_))
    ));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn import_rejects_invalid_entries() {
    let too_long = "x".repeat(catalog::MAX_NAME_LENGTH + 1);
    assert!(matches!(
        IngredientImporter::from_ingredients(vec![new_ingredient(&too_long, "g")]),
        Err(Error::Validation { field: "name", .. })
    ));
    assert!(matches!(
        IngredientImporter::from_ingredients(vec![new_ingredient("Salt", "")]),
        Err(Error::Validation {
            field: "measurement_unit",
            ..
        })
    ));
}
