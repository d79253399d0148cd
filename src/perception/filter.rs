use crate::perception::types::DetectionElement;

/// Number of elements `log_element_summary` prints before eliding the rest.
pub const SUMMARY_LIMIT: usize = 10;

/// Elements whose `content` or `source` contains `target`, case-insensitively,
/// in their original order. A blank target yields an empty list.
pub fn filter_by_text(elements: &[DetectionElement], target: &str) -> Vec<DetectionElement> {
    let needle = target.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let matched: Vec<DetectionElement> = elements
        .iter()
        .filter(|e| e.mentions(&needle))
        .cloned()
        .collect();

    tracing::debug!(
        target = %target.trim(),
        total = elements.len(),
        matched = matched.len(),
        "text filter applied"
    );
    matched
}

pub fn log_element_summary(elements: &[DetectionElement]) {
    tracing::info!(count = elements.len(), "detected elements");
    for (idx, elem) in elements.iter().take(SUMMARY_LIMIT).enumerate() {
        let (cx, cy) = elem.center();
        tracing::info!(
            idx,
            element_type = %elem.element_type,
            content = %elem.content,
            confidence = format_args!("{:.2}", elem.confidence),
            bbox = ?elem.bbox,
            center = format_args!("({cx:.1}, {cy:.1})"),
            interactivity = elem.interactivity,
            "element"
        );
    }
    if elements.len() > SUMMARY_LIMIT {
        tracing::info!(remaining = elements.len() - SUMMARY_LIMIT, "more elements not shown");
    }
}
