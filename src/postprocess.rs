use crate::models::Category;

pub const MAX_RESULT_LEN: usize = 8;

// Characters the models routinely read as digits
fn confusable(c: char) -> char {
    match c {
        '0' => 'O',
        '1' => 'I',
        '5' => 'S',
        c => c,
    }
}

/// Per-category output cleanup. Unknown inputs are treated as alphanumeric.
pub fn normalize(text: &str, category: Category) -> String {
    let cleaned = text.chars().filter(|c| !c.is_whitespace() && !c.is_control());
    let normalized: String = match category {
        Category::Numeric => cleaned.filter(char::is_ascii_digit).collect(),
        Category::Alphanumeric | Category::Unknown => {
            cleaned.filter(char::is_ascii_alphanumeric).map(confusable).collect()
        }
        Category::Chinese | Category::MathExpression => cleaned.collect(),
    };
    normalized.chars().take(MAX_RESULT_LEN).collect()
}
