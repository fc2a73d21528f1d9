/// Normalized edit-distance similarity in `[0, 1]`, case-insensitive.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }

    let longest = a.chars().count().max(b.chars().count());
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let distance = strsim::levenshtein(&a, &b);
    (longest - distance) as f64 / longest as f64
}
