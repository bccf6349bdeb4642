//! The parameters that a formula can refer to.

use crate::datatype::Datatype;

/// The ordered list of parameters available to a formula, each with the
/// datatype of the values it will be bound to.
///
/// Lookup is by exact name. If the same name is added twice, the first
/// declaration is the one that is found.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ParameterTable {
    parameters: Vec<(String, Datatype)>,
}

impl ParameterTable {
    /// Creates a table without any parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table from the parallel lists of parameter `names` and their
    /// `datatypes`.
    ///
    /// # Panics
    ///
    /// If `names` and `datatypes` have different lengths.
    #[must_use]
    pub fn from_parts(names: &[&str], datatypes: &[Datatype]) -> Self {
        assert_eq!(
            names.len(),
            datatypes.len(),
            "every parameter name needs exactly one datatype"
        );
        names
            .iter()
            .zip(datatypes)
            .map(|(name, datatype)| ((*name).to_string(), datatype.clone()))
            .collect()
    }

    /// Adds the parameter `name` of type `datatype`.
    ///
    /// # API Style
    ///
    /// Please note that this consumes `self` and is hence designed to have
    /// calls chained in the "fluent" API style.
    #[must_use]
    pub fn with(mut self, name: &str, datatype: Datatype) -> Self {
        self.add(name, datatype);
        self
    }

    pub fn add(&mut self, name: &str, datatype: Datatype) {
        self.parameters.push((name.to_string(), datatype));
    }

    /// Gets the datatype of the parameter called `name`, if there is one.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Datatype> {
        self.parameters.iter().find(|(n, _)| n == name).map(|(_, datatype)| datatype)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Iterates over the parameters in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Datatype)> {
        self.parameters.iter().map(|(name, datatype)| (name.as_str(), datatype))
    }
}

impl FromIterator<(String, Datatype)> for ParameterTable {
    fn from_iter<T: IntoIterator<Item = (String, Datatype)>>(iter: T) -> Self {
        Self {
            parameters: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{compile::parameter::ParameterTable, datatype::Datatype};

    #[test]
    fn the_first_declaration_wins() {
        let table = ParameterTable::new()
            .with("premium", Datatype::Money)
            .with("premium", Datatype::Decimal);

        assert_eq!(table.get("premium"), Some(&Datatype::Money));
        assert_eq!(table.get("Premium"), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn parts_are_paired_in_order() {
        let table = ParameterTable::from_parts(&["a", "b"], &[Datatype::int, Datatype::String]);

        let names = table.iter().map(|(name, _)| name).collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(table.get("b"), Some(&Datatype::String));
    }

    #[test]
    #[should_panic(expected = "exactly one datatype")]
    fn parts_must_have_equal_lengths() {
        let _ = ParameterTable::from_parts(&["a"], &[]);
    }
}
