//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values in one
/// pass, so placeholders inside substituted values stay literal. Unknown
/// `{...}` spans (JSON examples in prompts) are kept as written.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = String::with_capacity(tpl.len());
  let mut rest = tpl;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    let after = &rest[open + 1..];
    let hit = after.find('}').and_then(|close| {
      let key = &after[..close];
      pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| (*v, close))
    });
    match hit {
      Some((v, close)) => {
        out.push_str(v);
        rest = &after[close + 1..];
      }
      None => {
        out.push('{');
        rest = after;
      }
    }
  }
  out.push_str(rest);
  out
}

/// Strip a surrounding markdown code fence (```json ... ```) from a model reply.
pub fn strip_code_fences(s: &str) -> &str {
  let mut t = s.trim();
  if let Some(rest) = t.strip_prefix("```json") {
    t = rest;
  } else if let Some(rest) = t.strip_prefix("```") {
    t = rest;
  }
  if let Some(rest) = t.strip_suffix("```") {
    t = rest;
  }
  t.trim()
}

/// Keep at most `max` characters, appending "..." when something was cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    Some((idx, _)) => format!("{}...", &s[..idx]),
    None => s.to_string(),
  }
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    Some((idx, _)) => format!("{}… ({} bytes total)", &s[..idx], s.len()),
    None => s.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fences_are_removed() {
    assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(strip_code_fences("```\n{}\n```  "), "{}");
    assert_eq!(strip_code_fences(" {} "), "{}");
  }

  #[test]
  fn truncation_is_char_safe() {
    assert_eq!(truncate_chars("abc", 3), "abc");
    assert_eq!(truncate_chars("abcd", 3), "abc...");
    assert_eq!(truncate_chars("ééé", 2), "éé...");
    assert!(trunc_for_log(&"x".repeat(50), 10).starts_with("xxxxxxxxxx…"));
  }

  #[test]
  fn template_fills_all_keys() {
    let out = fill_template("{level} / {prefix} / {level}", &[("level", "advanced"), ("prefix", "a")]);
    assert_eq!(out, "advanced / a / advanced");
  }

  #[test]
  fn substituted_values_are_not_expanded_again() {
    let tpl = "Task: {scenario}\nPrompt: {prompt}\nReply as {\"score\": 0}";
    let out = fill_template(tpl, &[("scenario", "write {prompt} here"), ("prompt", "hello")]);
    assert_eq!(out, "Task: write {prompt} here\nPrompt: hello\nReply as {\"score\": 0}");
  }
}
