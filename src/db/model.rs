//! Row types returned by repositories.

/// Stored integration account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRow {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub provider: String,
    pub seller_id: Option<String>,
    pub is_active: bool,
}
