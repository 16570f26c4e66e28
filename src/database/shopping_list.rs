use std::{collections::BTreeMap, fmt};

use serde::Serialize;

use crate::{schema::ShoppingListRow, SHOPPING_LIST_HEADER};

/*
Shopping list document

List of ingredients for your recipes:

Flour (g) — 450
Salt (g) — 15
*/

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingList {
    pub lines: Vec<ShoppingListLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingListLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

impl ShoppingList {
    /// Merges rows that share both name and unit, summing their amounts.
    /// Lines come out ordered by name, then unit.
    pub fn from_rows(rows: Vec<ShoppingListRow>) -> Self {
        let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
        rows.into_iter().for_each(|row| {
            *totals.entry((row.name, row.measurement_unit)).or_insert(0) += row.amount;
        });

        Self {
            lines: totals
                .into_iter()
                .map(|((name, measurement_unit), amount)| ShoppingListLine {
                    name,
                    measurement_unit,
                    amount,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl fmt::Display for ShoppingListLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) — {}", self.name, self.measurement_unit, self.amount)
    }
}

impl fmt::Display for ShoppingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{SHOPPING_LIST_HEADER}")?;
        writeln!(f)?;
        for line in self.lines.iter() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

impl Into<String> for ShoppingList {
    fn into(self) -> String {
        self.to_string()
    }
}
