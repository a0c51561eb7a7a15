use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Price lookup capability, passed in by the host — never a global registry.
/// Used by the transaction builder when a row carries a quantity but no price.
pub trait PriceSource: Send + Sync {
    fn price(&self, symbol: &str, date: NaiveDate) -> Option<Decimal>;
}

/// Fixed per-symbol prices. Good enough for tests and hosts with a flat
/// price table; date is ignored.
#[derive(Debug, Default, Clone)]
pub struct StaticPriceSource {
    prices: BTreeMap<String, Decimal>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: impl Into<String>, price: Decimal) -> Self {
        self.prices.insert(symbol.into(), price);
        self
    }
}

impl PriceSource for StaticPriceSource {
    fn price(&self, symbol: &str, _date: NaiveDate) -> Option<Decimal> {
        self.prices.get(symbol).copied()
    }
}

/// A source with no prices at all — forces builders to rely on row data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPrices;

impl PriceSource for NoPrices {
    fn price(&self, _symbol: &str, _date: NaiveDate) -> Option<Decimal> {
        None
    }
}
