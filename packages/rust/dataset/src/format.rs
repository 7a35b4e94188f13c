//! Rendering of a dataset hit as assistant text.

use std::fmt::Write;

use medinfo_shared::MedicineRecord;

/// Format a record as a multi-line answer ending in a Markdown image link.
///
/// Field order is fixed: name, composition, uses, side effects,
/// manufacturer, the three review shares, image.
pub fn format_record(record: &MedicineRecord) -> String {
    let [excellent, average, poor] = record.reviews();
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "Here are the details I found for {}:", record.name);
    let _ = writeln!(out);
    let _ = writeln!(out, "Composition: {}", record.composition);
    let _ = writeln!(out, "Uses: {}", record.uses);
    let _ = writeln!(out, "Side Effects: {}", record.side_effects);
    let _ = writeln!(out, "Manufacturer: {}", record.manufacturer);
    let _ = writeln!(out, "Reviews:");
    let _ = writeln!(out, "  - Excellent: {excellent}%");
    let _ = writeln!(out, "  - Average: {average}%");
    let _ = writeln!(out, "  - Poor: {poor}%");
    let _ = write!(out, "[Image of {}]({})", record.name, record.image_url);

    out
}
