use serde::{Deserialize, Serialize};

use crate::text_utils::slugify;

/// Categories created for every new account, in display order.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Mercado",
    "Farmácia",
    "Transporte",
    "Alimentação",
    "Vestuário",
    "Casa",
    "Outros",
    "Eletrônicos",
    "Saúde",
    "Lazer",
    "Educação",
    "Pet Shop",
    "Serviços",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub normalized_name: String,
    pub monthly_budget_cents: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub monthly_budget_cents: i64,
}

impl NewCategory {
    pub fn normalized_name(&self) -> String {
        normalize_category_name(&self.name)
    }
}

/// Key enforcing per-user uniqueness of category names.
pub fn normalize_category_name(name: &str) -> String {
    slugify(name.trim())
}

/// A category with the amount spent in the month being displayed.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryWithSpending {
    #[serde(flatten)]
    pub category: Category,
    pub spent_cents: i64,
}

impl CategoryWithSpending {
    /// Share of the category budget used, or `None` without a budget.
    pub fn budget_percent(&self) -> Option<f64> {
        if self.category.monthly_budget_cents > 0 {
            Some(self.spent_cents as f64 / self.category.monthly_budget_cents as f64 * 100.0)
        } else {
            None
        }
    }

    pub fn over_budget(&self) -> bool {
        self.category.monthly_budget_cents > 0
            && self.spent_cents > self.category.monthly_budget_cents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_categories_are_distinct() {
        let mut keys: Vec<String> = DEFAULT_CATEGORIES
            .iter()
            .map(|n| normalize_category_name(n))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), DEFAULT_CATEGORIES.len());
    }

    #[test]
    fn test_normalize_ignores_case_and_accents() {
        assert_eq!(
            normalize_category_name(" Farmácia "),
            normalize_category_name("FARMACIA")
        );
    }
}
