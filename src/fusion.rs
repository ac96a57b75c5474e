// Deterministic tie-break between two candidate readings of the same image.

fn preferred_length(s: &str) -> bool {
    (4..=6).contains(&s.chars().count())
}

fn has_special(s: &str) -> bool {
    s.chars().any(|c| !c.is_alphanumeric())
}

fn mixes_letters_and_digits(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit()) && s.chars().any(char::is_alphabetic)
}

/// Picks one of `a` and `b`. Rules apply in order, each only when exactly one
/// candidate satisfies it:
/// equal → `a`; length in 4..=6; no special character; mixes letters and
/// digits; otherwise `a`.
pub fn choose<'a>(a: &'a str, b: &'a str) -> &'a str {
    if a == b {
        return a;
    }
    if preferred_length(a) != preferred_length(b) {
        return if preferred_length(a) { a } else { b };
    }
    if has_special(a) != has_special(b) {
        return if has_special(a) { b } else { a };
    }
    if mixes_letters_and_digits(a) != mixes_letters_and_digits(b) {
        return if mixes_letters_and_digits(a) { a } else { b };
    }
    a
}
