pub mod dcf;
pub mod growth;
pub mod implied_growth;
pub mod scenarios;
pub mod sensitivity;
pub mod wacc;
