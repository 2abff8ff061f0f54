/// Bearer key lookup by account id. Absence is a per-account condition the
/// coordinator reports, never a startup failure.
pub fn api_key_for(account_id: &str) -> Option<String> {
    let var = format!(
        "TIMERDECK_KEY_{}",
        account_id.to_uppercase().replace('-', "_")
    );
    std::env::var(var).ok().filter(|key| !key.is_empty())
}
