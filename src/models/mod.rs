pub mod budget_alert;
pub mod category;
pub mod expense;
pub mod income;
pub mod profile;
pub mod user;

pub use budget_alert::BudgetAlert;
pub use category::{
    normalize_category_name, Category, CategoryWithSpending, NewCategory, DEFAULT_CATEGORIES,
};
pub use expense::{
    Expense, ExpenseItem, ExpenseType, ExpenseWithCategory, NewExpense, NewExpenseItem,
    PaymentMethod,
};
pub use income::{Income, NewIncome};
pub use profile::{Profile, ProfileUpdate};
pub use user::{NewUser, User};
