use crate::{
    Result,
    backend::{Connection, Inheritance, Prefetch},
    placeholder::{ClauseTemplate, ParameterOrder, PlaceholderBinder, TemplateBuilder},
    spec::OptionSet,
};

/// The model-level inputs to assembly, detached from the concrete model type.
pub struct ModelInfo {
    pub table_name: String,
    pub inheritance: Option<Box<dyn Inheritance>>,
    pub prefetch: Option<Box<dyn Prefetch>>,
}

impl ModelInfo {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            inheritance: None,
            prefetch: None,
        }
    }

    pub fn of<M: crate::Model>() -> Self {
        Self {
            table_name: M::table_name().to_string(),
            inheritance: M::inheritance(),
            prefetch: M::prefetch(),
        }
    }

    pub fn with_inheritance(mut self, inheritance: impl Inheritance + 'static) -> Self {
        self.inheritance = Some(Box::new(inheritance));
        self
    }

    pub fn with_prefetch(mut self, prefetch: impl Prefetch + 'static) -> Self {
        self.prefetch = Some(Box::new(prefetch));
        self
    }

    fn type_restriction(&self) -> Option<String> {
        let inheritance = self.inheritance.as_ref()?;
        if inheritance.is_hierarchy_root() {
            return None;
        }
        inheritance.type_restriction_predicate()
    }
}

/// Builds one SQL template from normalized options, clause by clause:
/// SELECT, FROM, JOIN, WHERE, GROUP BY, ORDER BY, then pagination.
pub fn assemble(
    mut options: OptionSet,
    model: &ModelInfo,
    connection: &dyn Connection,
) -> Result<(ClauseTemplate, ParameterOrder)> {
    if let Some(prefetch) = &model.prefetch {
        prefetch.rewrite(&mut options)?;
    }

    let mut binder = PlaceholderBinder::new();
    let mut builder = TemplateBuilder::new("SELECT ");
    builder.push(options.select.as_deref().unwrap_or("*"));

    builder.push(" FROM ");
    builder.push(options.from.as_deref().unwrap_or(model.table_name.as_str()));

    // joins are static SQL
    if let Some(joins) = &options.joins {
        builder.push(" ").push(joins);
    }

    let mut predicates = Vec::new();
    if let Some(conditions) = &options.conditions {
        predicates.push(binder.bind(conditions));
    }
    if let Some(restriction) = model.type_restriction() {
        let mut restricted = TemplateBuilder::default();
        restricted.push(&restriction);
        predicates.push(restricted.build());
    }
    for (i, predicate) in predicates.iter().enumerate() {
        builder.push(if i == 0 { " WHERE (" } else { " AND (" });
        builder.push_template(predicate).push(")");
    }

    if let Some(group) = &options.group {
        let group = binder.bind(group);
        builder.push(" GROUP BY ").push_template(&group);
    }

    if let Some(order) = &options.order {
        let order = binder.bind(order);
        builder.push(" ORDER BY ").push_template(&order);
    }

    let limit = options.limit.as_deref().map(|limit| binder.bind(limit));
    let offset = options.offset.as_deref().map(|offset| binder.bind(offset));
    connection.apply_pagination(&mut builder, limit.as_ref(), offset.as_ref());

    Ok((builder.build(), binder.finish()))
}
