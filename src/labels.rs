use std::collections::HashMap;

pub mod keys {
    pub const EXPENSE_REPORT: &str = "Expense Report";
    pub const DATE: &str = "Date";
    pub const DESCRIPTION: &str = "Description";
    pub const CATEGORY: &str = "Category";
    pub const COST: &str = "Cost";
    pub const TOTAL: &str = "Total";
    pub const RECEIPTS: &str = "Receipts";
    pub const REPORTER_NAME: &str = "Reporter Name";
    pub const BANK_NAME: &str = "Bank Name";
    pub const CLEARING_NUMBER: &str = "Clearing Number";
    pub const ACCOUNT_NUMBER: &str = "Account Number";
    pub const PURPOSE: &str = "Purpose";
    pub const PASSENGERS: &str = "Passengers";
    pub const DISTANCE_KM: &str = "Distance (km)";
    pub const ROUTE: &str = "Route";
    pub const CALCULATED_DISTANCE_KM: &str = "Calculated distance (km)";
    pub const CONTINUED_FROM_PREVIOUS: &str = "Continued from previous page";
    pub const CONTINUED_ON_NEXT: &str = "Continued on next page";
    pub const RECEIPT_UNAVAILABLE: &str = "Receipt could not be rendered";
    pub const PAGE: &str = "Page";
}

/// Display-string lookup for fixed label keys. Unknown keys render as the key itself.
pub trait Labels: Send + Sync {
    fn lookup(&self, key: &str) -> Option<&str>;

    fn label<'a>(&'a self, key: &'a str) -> &'a str {
        self.lookup(key).unwrap_or(key)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    entries: HashMap<String, String>,
}

impl LabelTable {
    /// Keys are English already, so the English table is empty.
    pub fn english() -> Self {
        Self::default()
    }

    pub fn swedish() -> Self {
        let pairs = [
            (keys::EXPENSE_REPORT, "Utgiftsrapport"),
            (keys::DATE, "Datum"),
            (keys::DESCRIPTION, "Beskrivning"),
            (keys::CATEGORY, "Kategori"),
            (keys::COST, "Kostnad"),
            (keys::TOTAL, "Totalt"),
            (keys::RECEIPTS, "Kvitton"),
            (keys::REPORTER_NAME, "Rapportör"),
            (keys::BANK_NAME, "Banknamn"),
            (keys::CLEARING_NUMBER, "Clearingnummer"),
            (keys::ACCOUNT_NUMBER, "Kontonummer"),
            (keys::PURPOSE, "Syfte"),
            (keys::PASSENGERS, "Passagerare"),
            (keys::DISTANCE_KM, "Sträcka (km)"),
            (keys::ROUTE, "Rutt"),
            (keys::CALCULATED_DISTANCE_KM, "Beräknad sträcka (km)"),
            (keys::CONTINUED_FROM_PREVIOUS, "Fortsättning från föregående sida"),
            (keys::CONTINUED_ON_NEXT, "Fortsätter på nästa sida"),
            (keys::RECEIPT_UNAVAILABLE, "Kvittot kunde inte visas"),
            (keys::PAGE, "Sida"),
            ("Food", "Mat"),
            ("Travel", "Resor"),
            ("Supplies", "Material"),
            ("Marketing", "Marknadsföring"),
            ("Other", "Övrigt"),
        ];
        let mut table = Self::default();
        for (key, value) in pairs {
            table.insert(key, value);
        }
        table
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }
}

impl Labels for LabelTable {
    fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_falls_back_to_key_name() {
        let table = LabelTable::english();
        assert_eq!(table.label(keys::DISTANCE_KM), "Distance (km)");
        assert_eq!(table.label("4010 Svamparna"), "4010 Svamparna");
    }

    #[test]
    fn swedish_table_translates_fixed_keys_and_categories() {
        let table = LabelTable::swedish();
        assert_eq!(table.label(keys::RECEIPTS), "Kvitton");
        assert_eq!(table.label("Food"), "Mat");
    }

    #[test]
    fn overrides_replace_existing_entries() {
        let table = LabelTable::swedish().with(keys::TOTAL, "Summa");
        assert_eq!(table.label(keys::TOTAL), "Summa");
    }
}
