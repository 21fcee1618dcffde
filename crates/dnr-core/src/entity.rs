//! Silver entity kinds and their typed column layouts.
//!
//! Each [`EntityKind`] owns one `silver.*` table. The column list here is the
//! contract between source mappings (which name source columns for these
//! fields) and the entity transformer (which coerces values to [`FieldType`]).

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of normalized entity held in the silver layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Contact,
    Donation,
    Order,
    Invoice,
    Payment,
    Subscription,
    Tag,
    Note,
    Communication,
    Activity,
    Product,
}

/// Coercion target for a silver column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Trimmed text, empty becomes NULL
    Text,
    /// Lower-cased email, must contain `@`
    Email,
    /// Digits only
    Phone,
    /// Calendar date
    Date,
    /// Date and time
    Timestamp,
    /// Currency amount, two decimal places
    Amount,
    /// Yes/no flag
    Bool,
}

impl FieldType {
    /// SQL type used for this field in silver DDL
    pub fn sql_type(self) -> &'static str {
        match self {
            FieldType::Text | FieldType::Email | FieldType::Phone => "VARCHAR",
            FieldType::Date => "DATE",
            FieldType::Timestamp => "TIMESTAMP",
            FieldType::Amount => "DECIMAL(18,2)",
            FieldType::Bool => "BOOLEAN",
        }
    }
}

/// One mappable column of a silver entity
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
}

const fn field(name: &'static str, ty: FieldType) -> FieldSpec {
    FieldSpec { name, ty }
}

use FieldType::*;

/// Natural key column every entity carries
pub const SOURCE_RECORD_ID: &str = "source_record_id";

/// Foreign reference to the owning contact's source-local id
pub const CONTACT_SOURCE_ID: &str = "contact_source_id";

const CONTACT_FIELDS: &[FieldSpec] = &[
    field(SOURCE_RECORD_ID, Text),
    field("first_name", Text),
    field("last_name", Text),
    field("full_name", Text),
    field("organization", Text),
    field("email", Email),
    field("alt_email", Email),
    field("phone", Phone),
    field("alt_phone", Phone),
    field("address_line1", Text),
    field("address_line2", Text),
    field("city", Text),
    field("region", Text),
    field("postal_code", Text),
    field("country", Text),
    field("birth_date", Date),
    field("gender", Text),
    field("created_at", Timestamp),
    field("updated_at", Timestamp),
];

const DONATION_FIELDS: &[FieldSpec] = &[
    field(SOURCE_RECORD_ID, Text),
    field(CONTACT_SOURCE_ID, Text),
    field("amount", Amount),
    field("currency", Text),
    field("donated_at", Timestamp),
    field("campaign", Text),
    field("fund", Text),
    field("payment_method", Text),
    field("is_recurring", Bool),
    field("status", Text),
];

const ORDER_FIELDS: &[FieldSpec] = &[
    field(SOURCE_RECORD_ID, Text),
    field(CONTACT_SOURCE_ID, Text),
    field("order_number", Text),
    field("total_amount", Amount),
    field("currency", Text),
    field("ordered_at", Timestamp),
    field("status", Text),
    field("channel", Text),
];

const INVOICE_FIELDS: &[FieldSpec] = &[
    field(SOURCE_RECORD_ID, Text),
    field(CONTACT_SOURCE_ID, Text),
    field("invoice_number", Text),
    field("amount", Amount),
    field("issued_at", Timestamp),
    field("due_at", Timestamp),
    field("status", Text),
];

const PAYMENT_FIELDS: &[FieldSpec] = &[
    field(SOURCE_RECORD_ID, Text),
    field(CONTACT_SOURCE_ID, Text),
    field("invoice_source_id", Text),
    field("amount", Amount),
    field("paid_at", Timestamp),
    field("method", Text),
    field("status", Text),
];

const SUBSCRIPTION_FIELDS: &[FieldSpec] = &[
    field(SOURCE_RECORD_ID, Text),
    field(CONTACT_SOURCE_ID, Text),
    field("plan_name", Text),
    field("amount", Amount),
    field("billing_interval", Text),
    field("status", Text),
    field("started_at", Timestamp),
    field("canceled_at", Timestamp),
];

const TAG_FIELDS: &[FieldSpec] = &[
    field(SOURCE_RECORD_ID, Text),
    field(CONTACT_SOURCE_ID, Text),
    field("tag_name", Text),
    field("category", Text),
    field("tagged_at", Timestamp),
];

const NOTE_FIELDS: &[FieldSpec] = &[
    field(SOURCE_RECORD_ID, Text),
    field(CONTACT_SOURCE_ID, Text),
    field("body", Text),
    field("author", Text),
    field("created_at", Timestamp),
];

const COMMUNICATION_FIELDS: &[FieldSpec] = &[
    field(SOURCE_RECORD_ID, Text),
    field(CONTACT_SOURCE_ID, Text),
    field("channel", Text),
    field("direction", Text),
    field("subject", Text),
    field("status", Text),
    field("sent_at", Timestamp),
];

const ACTIVITY_FIELDS: &[FieldSpec] = &[
    field(SOURCE_RECORD_ID, Text),
    field(CONTACT_SOURCE_ID, Text),
    field("activity_type", Text),
    field("description", Text),
    field("occurred_at", Timestamp),
];

const PRODUCT_FIELDS: &[FieldSpec] = &[
    field(SOURCE_RECORD_ID, Text),
    field("name", Text),
    field("sku", Text),
    field("price", Amount),
    field("category", Text),
    field("is_active", Bool),
];

/// Contact columns that count towards profile completeness
pub const PROFILE_FIELDS: &[&str] = &[
    "first_name",
    "last_name",
    "full_name",
    "organization",
    "email",
    "phone",
    "address_line1",
    "city",
    "region",
    "postal_code",
    "country",
    "birth_date",
    "gender",
];

impl EntityKind {
    /// All entity kinds, contacts first
    pub const ALL: [EntityKind; 11] = [
        EntityKind::Contact,
        EntityKind::Donation,
        EntityKind::Order,
        EntityKind::Invoice,
        EntityKind::Payment,
        EntityKind::Subscription,
        EntityKind::Tag,
        EntityKind::Note,
        EntityKind::Communication,
        EntityKind::Activity,
        EntityKind::Product,
    ];

    /// Lower-case name used in configs and CLI flags
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Contact => "contact",
            EntityKind::Donation => "donation",
            EntityKind::Order => "order",
            EntityKind::Invoice => "invoice",
            EntityKind::Payment => "payment",
            EntityKind::Subscription => "subscription",
            EntityKind::Tag => "tag",
            EntityKind::Note => "note",
            EntityKind::Communication => "communication",
            EntityKind::Activity => "activity",
            EntityKind::Product => "product",
        }
    }

    /// Schema-qualified silver table name
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Contact => "silver.contact",
            EntityKind::Donation => "silver.donation",
            EntityKind::Order => "silver.store_order",
            EntityKind::Invoice => "silver.invoice",
            EntityKind::Payment => "silver.payment",
            EntityKind::Subscription => "silver.subscription",
            EntityKind::Tag => "silver.tag",
            EntityKind::Note => "silver.note",
            EntityKind::Communication => "silver.communication",
            EntityKind::Activity => "silver.activity",
            EntityKind::Product => "silver.product",
        }
    }

    /// Mappable columns, `source_record_id` first
    pub fn fields(self) -> &'static [FieldSpec] {
        match self {
            EntityKind::Contact => CONTACT_FIELDS,
            EntityKind::Donation => DONATION_FIELDS,
            EntityKind::Order => ORDER_FIELDS,
            EntityKind::Invoice => INVOICE_FIELDS,
            EntityKind::Payment => PAYMENT_FIELDS,
            EntityKind::Subscription => SUBSCRIPTION_FIELDS,
            EntityKind::Tag => TAG_FIELDS,
            EntityKind::Note => NOTE_FIELDS,
            EntityKind::Communication => COMMUNICATION_FIELDS,
            EntityKind::Activity => ACTIVITY_FIELDS,
            EntityKind::Product => PRODUCT_FIELDS,
        }
    }

    /// Look up a field by column name
    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|f| f.name == name)
    }

    /// Whether rows of this kind reference a contact by source id
    pub fn references_contact(self) -> bool {
        self.field(CONTACT_SOURCE_ID).is_some()
    }

    /// Transaction kinds that reference a contact
    pub fn transactional() -> impl Iterator<Item = EntityKind> {
        Self::ALL.into_iter().filter(|k| k.references_contact())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let lower = s.trim().to_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lower)
            .ok_or(CoreError::UnknownEntityKind { kind: lower })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_starts_with_natural_key() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.fields()[0].name, SOURCE_RECORD_ID, "{kind}");
        }
    }

    #[test]
    fn test_transactional_kinds() {
        let kinds: Vec<_> = EntityKind::transactional().collect();
        assert!(kinds.contains(&EntityKind::Donation));
        assert!(kinds.contains(&EntityKind::Tag));
        assert!(!kinds.contains(&EntityKind::Contact));
        assert!(!kinds.contains(&EntityKind::Product));
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("Donation".parse::<EntityKind>().unwrap(), EntityKind::Donation);
        assert!("pledge".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_profile_fields_exist_on_contact() {
        for name in PROFILE_FIELDS {
            assert!(EntityKind::Contact.field(name).is_some(), "{name}");
        }
    }
}
