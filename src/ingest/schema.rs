use crate::domain::{LOAD_FIELD, WEATHER_FIELDS};

/// Normalize a source column name: trimmed, lowercase, spaces as underscores.
pub fn normalize_name(raw: &str) -> String {
    raw.trim().to_lowercase().replace(' ', "_")
}

/// How one store field is recognised among a provider's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    /// Alternative column names with the factor that converts them to the
    /// field's unit.
    pub aliases: Vec<(String, f64)>,
    /// Last resort: first column whose name contains one of these.
    pub contains: Vec<String>,
}

impl FieldSpec {
    pub fn exact(name: &str) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            contains: Vec::new(),
        }
    }

    pub fn alias(mut self, name: &str, scale: f64) -> Self {
        self.aliases.push((name.to_string(), scale));
        self
    }

    pub fn containing(mut self, fragment: &str) -> Self {
        self.contains.push(fragment.to_string());
        self
    }

    /// Index and unit scale of the matching column in `columns` (already
    /// normalized).
    fn resolve(&self, columns: &[String]) -> Option<(usize, f64)> {
        if let Some(i) = columns.iter().position(|c| *c == self.name) {
            return Some((i, 1.0));
        }
        for (alias, scale) in &self.aliases {
            if let Some(i) = columns.iter().position(|c| c == alias) {
                return Some((i, *scale));
            }
        }
        self.contains
            .iter()
            .find_map(|frag| columns.iter().position(|c| c.contains(frag.as_str())))
            .map(|i| (i, 1.0))
    }
}

/// Target layout of a store, in store field order.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSchema {
    pub fields: Vec<FieldSpec>,
}

impl SeriesSchema {
    /// System load in MW.
    pub fn load() -> Self {
        Self {
            fields: vec![FieldSpec::exact(LOAD_FIELD)
                .alias("mw", 1.0)
                .alias("value", 1.0)
                .alias("integrated_load", 1.0)
                .alias("kw", 0.001)
                .containing("load")
                .containing("mw")],
        }
    }

    /// Hourly temperature (°C), relative humidity (%) and precipitation (mm).
    pub fn weather() -> Self {
        let [temperature, humidity, precipitation] = WEATHER_FIELDS;
        Self {
            fields: vec![
                FieldSpec::exact(temperature).alias("temperature", 1.0),
                FieldSpec::exact(humidity)
                    .alias("relative_humidity", 1.0)
                    .alias("humidity", 1.0),
                FieldSpec::exact(precipitation).alias("precip", 1.0),
            ],
        }
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// For each schema field, the source column index and unit scale, or the
    /// name of the first field that could not be found.
    pub fn resolve(&self, raw_columns: &[String]) -> Result<Vec<(usize, f64)>, String> {
        let columns: Vec<String> = raw_columns.iter().map(|c| normalize_name(c)).collect();
        self.fields
            .iter()
            .map(|f| f.resolve(&columns).ok_or_else(|| f.name.clone()))
            .collect()
    }
}
