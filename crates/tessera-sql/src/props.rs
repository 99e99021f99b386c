use tessera_core::token::TokenParser;
use tessera_core::Result;

use indexmap::IndexMap;

/// Substitutes `${name}` tokens against a variables map. Unknown names are
/// left in place so a later stage (or the per-invocation interpolator) can
/// still see them.
pub fn interpolate(text: &str, variables: &IndexMap<String, String>) -> Result<String> {
    if variables.is_empty() {
        return Ok(text.to_string());
    }
    TokenParser::interpolations().parse(text, &mut |name| {
        Ok(match variables.get(name.trim()) {
            Some(value) => value.clone(),
            None => format!("${{{name}}}"),
        })
    })
}
