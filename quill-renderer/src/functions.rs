//! Template function table: filters and functions installed into every
//! artifact at parse time.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use heck::{ToKebabCase, ToLowerCamelCase, ToPascalCase, ToSnakeCase};
use tera::{Tera, Value};

type FilterFn = Arc<dyn Fn(&Value, &HashMap<String, Value>) -> tera::Result<Value> + Send + Sync>;
type FunctionFn = Arc<dyn Fn(&HashMap<String, Value>) -> tera::Result<Value> + Send + Sync>;

/// Named filters and functions made available to templates.
#[derive(Clone, Default)]
pub struct TemplateFunctions {
    filters: BTreeMap<String, FilterFn>,
    functions: BTreeMap<String, FunctionFn>,
}

impl TemplateFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in case-conversion filters.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register_filter("snake_case", |v, _| case_filter("snake_case", v, to_snake_case));
        table.register_filter("kebab_case", |v, _| case_filter("kebab_case", v, to_kebab_case));
        table.register_filter("pascal_case", |v, _| case_filter("pascal_case", v, to_pascal_case));
        table.register_filter("camel_case", |v, _| case_filter("camel_case", v, to_camel_case));
        table
    }

    pub fn register_filter<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&Value, &HashMap<String, Value>) -> tera::Result<Value> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn register_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&HashMap<String, Value>) -> tera::Result<Value> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.functions.is_empty()
    }

    /// Register every entry on `tera`.
    pub(crate) fn install(&self, tera: &mut Tera) {
        for (name, filter) in &self.filters {
            let filter = Arc::clone(filter);
            tera.register_filter(name, move |v: &Value, args: &HashMap<String, Value>| {
                filter(v, args)
            });
        }
        for (name, function) in &self.functions {
            let function = Arc::clone(function);
            tera.register_function(name, move |args: &HashMap<String, Value>| function(args));
        }
    }
}

impl fmt::Debug for TemplateFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateFunctions")
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Case conversion
// ---------------------------------------------------------------------------

fn case_filter(name: &str, value: &Value, convert: fn(&str) -> String) -> tera::Result<Value> {
    let s = value
        .as_str()
        .ok_or_else(|| tera::Error::msg(format!("filter `{name}` expects a string, got {value}")))?;
    Ok(Value::String(convert(s)))
}

fn to_snake_case(s: &str) -> String {
    s.to_snake_case()
}

fn to_kebab_case(s: &str) -> String {
    s.to_kebab_case()
}

fn to_pascal_case(s: &str) -> String {
    s.to_pascal_case()
}

fn to_camel_case(s: &str) -> String {
    s.to_lower_camel_case()
}
