//! Configuration access port trait.

/// Section names are case-insensitive. Names that select a section
/// (strategies, populations) are compared in this form.
pub fn section_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// All section names, sorted.
    fn sections(&self) -> Vec<String>;

    /// Key/value pairs of one section, sorted by key. Keys without a value
    /// are skipped.
    fn section(&self, name: &str) -> Vec<(String, String)>;
}
