//! Instructions sent to the extraction models and to the judge.
//!
//! Callers can override both through
//! [`crate::config::EnsembleConfig::instruction`] and
//! [`crate::config::EnsembleConfig::judge_prompt`]; the constants here are
//! used only when no override is provided.

/// Default instruction sent with the receipt image to every extraction model.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"Extract the following information from this receipt:
1. Item Code: A unique code that corresponds to each individual item. Each item has only one unique code.
2. Item Name: The name of the item as it appears on the receipt.
3. Item Price: The price of each item as listed on the receipt.
4. Total Price: The final price at the bottom of the receipt.

Organize the extracted data into a LaTeX table format with the following headers: `Item Code`, `Item Name`, `Item Price`, and `Total Price`. Ensure that:
- Each row corresponds to a specific item on the receipt.
- Each item has only one unique code.
- The final row includes the total price.

Return only the LaTeX code for the table. Do not include any preamble, explanations, or additional text.
"#;

/// Default judge criteria. The rendered candidate list is appended after it.
pub const DEFAULT_JUDGE_PROMPT: &str = r#"You are a decision engine.

Your task is to analyze multiple LaTeX tables extracted from a receipt and select the most accurate and complete one.

### Receipt Item Details
- Each item is represented in the receipt as a line containing:
  - `Item Code`: A unique numeric or alphanumeric code.
  - `Item Name`: The name of the product.
  - `Item Price`: The price of the product in the format `X.XX EUR`.

### Accuracy Validation Criteria
1. The LaTeX table must match the receipt format:
   - Each row in the table must correspond to an item in the receipt with `Item Code`, `Item Name`, and `Item Price`.
   - The **Total Price** must match the sum of all items in the receipt.
2. Items must:
   - Have unique `Item Codes`.
   - Contain clear, descriptive `Item Names` without truncations or inaccuracies.
   - Include correct `Item Prices` as per the receipt.
3. The table structure must:
   - Start with the headers: `Item Code`, `Item Name`, `Item Price`, `Total Price`.
   - Include a **final row** with the Total Price clearly labeled.

### Instructions
- Analyze the LaTeX tables below.
- Compare the tables for both logical accuracy and structural correctness.
- Return only the LaTeX code of the best table. If no table meets the criteria, return an empty response.
- Do not include any explanations or additional text."#;

/// Heading placed between the criteria and the numbered options.
pub const CANDIDATES_HEADING: &str = "### LaTeX Tables to Analyze";

/// Label for the 1-based option `index`.
pub fn option_label(index: usize, failed: bool) -> String {
    if failed {
        format!("Option {index} (extraction failed):")
    } else {
        format!("Option {index}:")
    }
}

/// Assemble the full judge instruction from a criteria header and the
/// already-formatted option block.
pub fn judge_instruction(criteria: &str, formatted_options: &str) -> String {
    format!(
        "{}\n\n{}\n{}\n",
        criteria.trim_end(),
        CANDIDATES_HEADING,
        formatted_options
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_prompt_names_all_headers() {
        for h in ["Item Code", "Item Name", "Item Price", "Total Price"] {
            assert!(DEFAULT_EXTRACTION_PROMPT.contains(h), "missing {h}");
        }
    }

    #[test]
    fn judge_prompt_allows_empty_answer() {
        assert!(DEFAULT_JUDGE_PROMPT.contains("return an empty response"));
        assert!(DEFAULT_JUDGE_PROMPT.contains("unique `Item Codes`"));
    }

    #[test]
    fn option_labels() {
        assert_eq!(option_label(1, false), "Option 1:");
        assert_eq!(option_label(2, true), "Option 2 (extraction failed):");
    }

    #[test]
    fn judge_instruction_places_options_last() {
        let s = judge_instruction("criteria\n\n", "Option 1:\nA");
        assert!(s.starts_with("criteria\n\n### LaTeX Tables to Analyze\nOption 1:\nA"));
    }
}
