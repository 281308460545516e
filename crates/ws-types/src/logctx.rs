//! `%(key)`-style log placeholder interpolation — spec §7/§9.
//!
//! Preserved as the stable wire format for log records and webhook error
//! bodies. The logger/record producer is the only place that should call
//! this; everywhere else uses `tracing`'s structured fields directly.

/// Replace every `%(key)` occurrence in `template` with its value from
/// `context`. Unknown keys are left untouched (not an error — a record
/// with a typo'd key should still be readable).
pub fn render(template: &str, context: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("%(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        if let Some(end) = after.find(')') {
            let key = &after[..end];
            match context.iter().find(|(k, _)| *k == key) {
                Some((_, v)) => out.push_str(v),
                None => {
                    out.push_str("%(");
                    out.push_str(key);
                    out.push(')');
                }
            }
            rest = &after[end + 1..];
        } else {
            out.push_str("%(");
            rest = after;
        }
    }
    out.push_str(rest);
    out
}
