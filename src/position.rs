use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Position {
    symbol: String,
    quantity: f64,
    cost: f64,
    current: f64,
}

impl Position {
    pub fn new(symbol: &str, quantity: f64, cost: f64, current: f64) -> Position {
        Position {
            symbol: symbol.to_string(),
            quantity,
            cost,
            current,
        }
    }

    pub fn get_symbol(&self) -> &str {
        &self.symbol
    }

    pub fn get_quantity(&self) -> f64 {
        self.quantity
    }

    /// Cost basis per unit
    pub fn get_cost(&self) -> f64 {
        self.cost
    }

    /// Current price per unit
    pub fn get_current(&self) -> f64 {
        self.current
    }

    pub fn value(&self) -> f64 {
        self.quantity * self.current
    }

    /// Unrealized gain (negative for a loss)
    pub fn gain_loss(&self) -> f64 {
        (self.current - self.cost) * self.quantity
    }
}
