/// Read an environment variable with the `LERNWERK_` prefix.
///
/// Returns `None` when the variable is unset or empty.
pub fn get_env_with_prefix(name: &str) -> Option<String> {
    std::env::var(format!("LERNWERK_{name}"))
        .ok()
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_env_with_prefix() {
        std::env::set_var("LERNWERK_UTIL_TEST", "value");
        assert_eq!(get_env_with_prefix("UTIL_TEST"), Some("value".to_string()));
        std::env::remove_var("LERNWERK_UTIL_TEST");
        assert_eq!(get_env_with_prefix("UTIL_TEST"), None);
    }
}
