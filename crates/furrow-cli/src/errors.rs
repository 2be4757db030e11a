//! Better error messages with actionable suggestions.

use furrow_core::{Catalog, IdentifyError, ResolveError, Resolver, SettingsError};

/// Explain why a path could not be planned.
pub fn plan_error(err: &ResolveError, catalog: &Catalog) -> String {
    match err {
        ResolveError::UnknownType(name) => unknown_type_error(name, catalog),
        ResolveError::NoPath { from, to } => no_path_error(from, to, catalog),
        ResolveError::Disabled { from, to } => format!(
            "A conversion from '{}' to '{}' exists, but it needs a disabled type group.\n\n\
             Remove the group from `disabled_groups` in the config file, or drop --disable.",
            from, to
        ),
        ResolveError::MissingParameter { from, to, prompt } => format!(
            "Converting '{}' to '{}' needs a parameter ({}).\n\n\
             Pass it as the fourth part of --field, e.g. --field {}::{}:<{}>",
            from, to, prompt, to, from, prompt
        ),
        other => other.to_string(),
    }
}

/// Explain why a settings document could not be compiled.
pub fn settings_error(err: &SettingsError, catalog: &Catalog) -> String {
    match err {
        SettingsError::UnknownType(name) => unknown_type_error(name, catalog),
        SettingsError::Field {
            source: IdentifyError::Resolve(resolve),
            ..
        } => plan_error(resolve, catalog),
        SettingsError::Field {
            source: IdentifyError::UnknownType(name),
            ..
        } => unknown_type_error(name, catalog),
        SettingsError::Field {
            target,
            source: IdentifyError::NoSourcePath { .. },
        } => {
            let resolver = Resolver::new(catalog);
            let sources = source_types(target, &resolver);
            let mut msg = format!("No input column can be converted to '{}'", target);
            if sources.is_empty() {
                msg.push_str(".\n\nNothing in the catalog converts to it.");
            } else {
                msg.push_str(&format!(
                    ".\n\n'{}' can be created from: {}\n\
                     Name a column and its type with --field {}:<column>:<type>.",
                    target,
                    sources.join(", "),
                    target
                ));
            }
            msg
        }
        other => other.to_string(),
    }
}

fn unknown_type_error(name: &str, catalog: &Catalog) -> String {
    let mut msg = format!("Unknown type '{}'", name);
    if let Some(suggestion) = find_similar_type(name, catalog) {
        msg.push_str(&format!(". Did you mean '{}'?", suggestion));
    } else {
        msg.push_str(". Run `furrow types` to list known types.");
    }
    msg
}

/// Build an error message for when no conversion path is found.
pub fn no_path_error(from: &str, to: &str, catalog: &Catalog) -> String {
    let resolver = Resolver::new(catalog);
    let mut msg = format!("No conversion path found from '{}' to '{}'.\n\n", from, to);

    let targets = resolver.reachable_targets(from);
    if targets.is_empty() {
        msg.push_str(&format!("'{}' has no registered conversions.\n", from));
    } else {
        msg.push_str(&format!(
            "'{}' can convert to: {}\n",
            from,
            targets.join(", ")
        ));
    }

    let sources = source_types(to, &resolver);
    if !sources.is_empty() {
        msg.push_str(&format!(
            "'{}' can be created from: {}",
            to,
            sources.join(", ")
        ));
    }

    msg.trim_end().to_string()
}

/// Public types with a path to `target`.
fn source_types(target: &str, resolver: &Resolver<'_>) -> Vec<String> {
    let catalog = resolver.catalog();
    let mut sources: Vec<String> = resolver
        .shortest_distances(target, true)
        .into_keys()
        .filter(|name| name != target)
        .filter(|name| catalog.get(name).is_some_and(|t| !t.private))
        .collect();
    sources.sort();
    sources
}

/// Find a type name close to a misspelled one.
fn find_similar_type<'c>(input: &str, catalog: &'c Catalog) -> Option<&'c str> {
    let input = input.to_lowercase();
    catalog
        .types()
        .map(|t| (t.name.as_str(), levenshtein(&input, &t.name)))
        .filter(|(_, distance)| *distance <= 2)
        .min_by_key(|(_, distance)| *distance)
        .map(|(name, _)| name)
}

/// Edit distance between two names, for typo suggestions.
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = (above + 1)
                .min(row[j] + 1)
                .min(diagonal + usize::from(ca != cb));
            diagonal = above;
        }
    }

    row[b.len()]
}
