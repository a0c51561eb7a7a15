use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use saldo_core::{TransactionKind, Unit};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Invalid action pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("Failed to parse profile TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Maps a broker action verb to a transaction kind. Patterns are regexes,
/// matched case-insensitively, first match wins in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRule {
    pub pattern: String,
    pub kind: TransactionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProfileSpec {
    name: String,
    #[serde(default = "default_currency")]
    base_currency: String,
    #[serde(default = "default_cash_account")]
    cash_account: String,
    action_rules: Vec<ActionRule>,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_cash_account() -> String {
    "Brokerage Cash".to_string()
}

struct CompiledRule {
    regex: regex::Regex,
    kind: TransactionKind,
}

/// Per-institution materialization configuration: base currency, cash
/// account name, and the action classification rules.
pub struct InstitutionProfile {
    pub name: String,
    pub base_currency: Unit,
    pub cash_account: String,
    rules: Vec<CompiledRule>,
}

impl InstitutionProfile {
    pub fn new(
        name: impl Into<String>,
        base_currency: Unit,
        cash_account: impl Into<String>,
        action_rules: Vec<ActionRule>,
    ) -> Result<Self, ProfileError> {
        let rules = action_rules
            .into_iter()
            .map(|rule| {
                RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|regex| CompiledRule { regex, kind: rule.kind })
                    .map_err(|source| ProfileError::InvalidPattern {
                        pattern: rule.pattern,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(InstitutionProfile {
            name: name.into(),
            base_currency,
            cash_account: cash_account.into(),
            rules,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, ProfileError> {
        let spec: ProfileSpec = toml::from_str(content)?;
        Self::new(
            spec.name,
            Unit::new(spec.base_currency),
            spec.cash_account,
            spec.action_rules,
        )
    }

    /// Covers the action verbs common across brokerage exports.
    pub fn generic() -> Self {
        let rules = vec![
            rule(r"buy|bought|reinvest", TransactionKind::Buy),
            rule(r"sell|sold", TransactionKind::Sell),
            rule(r"dividend|div\b", TransactionKind::Dividend),
            rule(r"interest", TransactionKind::Interest),
            rule(r"deposit|contribution|ach in", TransactionKind::Deposit),
            rule(r"withdraw|ach out", TransactionKind::Withdrawal),
            rule(r"transfer in|xfer in", TransactionKind::TransferIn),
            rule(r"transfer out|xfer out", TransactionKind::TransferOut),
            rule(r"fee|commission", TransactionKind::Fee),
            rule(r"tax|withholding", TransactionKind::Tax),
            rule(r"split", TransactionKind::Split),
        ];
        InstitutionProfile::new("generic", Unit::usd(), "Brokerage Cash", rules)
            .expect("built-in patterns are valid")
    }

    pub fn classify(&self, action: &str) -> Option<TransactionKind> {
        self.rules
            .iter()
            .find(|r| r.regex.is_match(action))
            .map(|r| r.kind)
    }
}

fn rule(pattern: &str, kind: TransactionKind) -> ActionRule {
    ActionRule {
        pattern: pattern.to_string(),
        kind,
    }
}
