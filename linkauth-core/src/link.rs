use url::Url;

use crate::error::ValidationError;
use crate::validation::validate_redirect_url;

/// Query parameter carrying the token in a magic link.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Appends `token` to `base` as the `token` query parameter.
///
/// The path, the fragment and every other query parameter of `base` are kept; an
/// existing `token` parameter is replaced.
pub fn build_magic_link(base: &str, token: &str) -> Result<String, ValidationError> {
    let mut url: Url = validate_redirect_url(base)?;

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != TOKEN_QUERY_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(TOKEN_QUERY_PARAM, token);

    Ok(url.into())
}
