use std::collections::BTreeMap;

const KEPT_KEYS: [&str; 6] = [
    "CPU family",
    "Model name",
    "Vendor ID",
    "Model",
    "Stepping",
    "Flags",
];

/// Parse the `lscpu` fields used for diagnostics.
pub fn parse_lscpu(output: &str) -> BTreeMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim();
            KEPT_KEYS
                .contains(&key)
                .then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}
