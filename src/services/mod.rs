pub mod alerts;
pub mod budget;
pub mod charts;
pub mod cnpj;
pub mod installments;
pub mod mailer;
pub mod receipt;
