use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Dinheiro,
    Credito,
    Debito,
    Pix,
    Boleto,
    ValeAlimentacao,
    ValeRefeicao,
    Outros,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 8] = [
        PaymentMethod::Dinheiro,
        PaymentMethod::Credito,
        PaymentMethod::Debito,
        PaymentMethod::Pix,
        PaymentMethod::Boleto,
        PaymentMethod::ValeAlimentacao,
        PaymentMethod::ValeRefeicao,
        PaymentMethod::Outros,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Dinheiro => "DINHEIRO",
            PaymentMethod::Credito => "CREDITO",
            PaymentMethod::Debito => "DEBITO",
            PaymentMethod::Pix => "PIX",
            PaymentMethod::Boleto => "BOLETO",
            PaymentMethod::ValeAlimentacao => "VALE_ALIMENTACAO",
            PaymentMethod::ValeRefeicao => "VALE_REFEICAO",
            PaymentMethod::Outros => "OUTROS",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentMethod::Dinheiro => "Dinheiro",
            PaymentMethod::Credito => "Cartão de Crédito",
            PaymentMethod::Debito => "Cartão de Débito",
            PaymentMethod::Pix => "Pix",
            PaymentMethod::Boleto => "Boleto",
            PaymentMethod::ValeAlimentacao => "Vale Alimentação",
            PaymentMethod::ValeRefeicao => "Vale Refeição",
            PaymentMethod::Outros => "Outros",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseType {
    Fixa,
    Variavel,
}

impl ExpenseType {
    pub const ALL: [ExpenseType; 2] = [ExpenseType::Fixa, ExpenseType::Variavel];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseType::Fixa => "FIXA",
            ExpenseType::Variavel => "VARIAVEL",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExpenseType::Fixa => "Fixa",
            ExpenseType::Variavel => "Variável",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FIXA" => Some(ExpenseType::Fixa),
            "VARIAVEL" => Some(ExpenseType::Variavel),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExpenseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Expense {
    pub id: i64,
    pub user_id: i64,
    pub category_id: Option<i64>,
    pub issuer_name: String,
    pub issuer_tax_id: Option<String>,
    pub description: String,
    pub amount_cents: i64,
    pub discount_cents: i64,
    pub installment_index: i64,
    pub installment_count: i64,
    pub payment_method: PaymentMethod,
    pub expense_type: ExpenseType,
    pub date: String,
    pub notes: String,
    pub item_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Expense {
    /// `"2/10"` for installment rows, empty for single payments.
    pub fn installment_label(&self) -> String {
        if self.installment_count > 1 {
            format!("{}/{}", self.installment_index, self.installment_count)
        } else {
            String::new()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseWithCategory {
    #[serde(flatten)]
    pub expense: Expense,
    pub category_name: Option<String>,
    pub owner_email: String,
}

/// Values written for one expense row.
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub category_id: Option<i64>,
    pub issuer_name: String,
    pub issuer_tax_id: Option<String>,
    pub description: String,
    pub amount_cents: i64,
    pub discount_cents: i64,
    pub installment_index: i64,
    pub installment_count: i64,
    pub payment_method: PaymentMethod,
    pub expense_type: ExpenseType,
    pub date: String,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpenseItem {
    pub id: i64,
    pub expense_id: i64,
    pub name: String,
    pub code: Option<String>,
    /// Quantity in thousandths (0.500 kg is 500).
    pub quantity_milli: i64,
    pub unit: Option<String>,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewExpenseItem {
    pub name: String,
    pub code: Option<String>,
    pub quantity_milli: i64,
    pub unit: Option<String>,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}
