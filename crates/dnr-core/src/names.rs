//! Strongly-typed names for source systems and serving views.

use crate::newtype_string::define_newtype_string;

define_newtype_string! {
    /// Name of a registered source system (e.g. `keap`, `givebutter`).
    ///
    /// Doubles as the first path segment of blob keys (`{source}/{filename}`).
    pub struct SourceName;
}

define_newtype_string! {
    /// Unqualified name of a serving view (e.g. `donor_summary`).
    pub struct ViewName;
}

impl ViewName {
    /// Schema-qualified relation name in the serving layer
    pub fn qualified(&self) -> String {
        format!("serving.{}", self.0)
    }
}
