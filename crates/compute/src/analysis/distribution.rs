use std::collections::BTreeMap;

/// Bucket used for records without a label.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Label -> count, sorted by label.
pub type Distribution = BTreeMap<String, usize>;

/// Counts records per label. Missing or empty labels count as
/// [`UNKNOWN_LABEL`].
pub fn count_by_label<'a, I>(labels: I) -> Distribution
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut out = Distribution::new();
    for label in labels {
        let key = match label {
            Some(l) if !l.is_empty() => l,
            _ => UNKNOWN_LABEL,
        };
        match out.get_mut(key) {
            Some(n) => *n += 1,
            None => {
                out.insert(key.to_string(), 1);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{UNKNOWN_LABEL, count_by_label};

    #[test]
    fn counts_and_buckets_missing_labels() {
        let d = count_by_label([Some("Actb"), None, Some("Actb"), Some(""), Some("Gapdh")]);
        assert_eq!(d.get("Actb"), Some(&2));
        assert_eq!(d.get("Gapdh"), Some(&1));
        assert_eq!(d.get(UNKNOWN_LABEL), Some(&2));
        assert_eq!(d.values().sum::<usize>(), 5);
    }

    #[test]
    fn empty_input_is_empty_distribution() {
        assert!(count_by_label(std::iter::empty()).is_empty());
    }
}
