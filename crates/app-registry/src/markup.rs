use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;

/// Elements that never take a closing tag in HTML. A start tag for one of
/// these is treated as self-closing during the balance walk.
const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MarkupError {
    #[error("markup is not well formed: {0}")]
    Syntax(String),
    #[error("mismatched closing tag: expected </{expected}>, found </{found}>")]
    Mismatched { expected: String, found: String },
    #[error("unclosed tag: <{0}>")]
    Unclosed(String),
}

/// Checks that an HTML fragment is well formed: every non-void start tag has
/// a matching end tag in the right order, and the markup itself tokenizes.
/// The fragment is wrapped in a synthetic root so multiple top-level nodes
/// and bare text are accepted.
pub fn ensure_well_formed(fragment: &str) -> Result<(), MarkupError> {
    let wrapped = format!("<fragment-root>{fragment}</fragment-root>");
    let mut reader = Reader::from_str(&wrapped);
    reader.config_mut().check_end_names = false;

    let mut open: Vec<String> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = tag_name(start.name().as_ref());
                if !is_void(&name) && name != "fragment-root" {
                    open.push(name);
                }
            }
            Ok(Event::End(end)) => {
                let name = tag_name(end.name().as_ref());
                if is_void(&name) || name == "fragment-root" {
                    continue;
                }
                match open.pop() {
                    Some(expected) if expected == name => {}
                    Some(expected) => {
                        return Err(MarkupError::Mismatched {
                            expected,
                            found: name,
                        });
                    }
                    None => {
                        return Err(MarkupError::Syntax(format!(
                            "closing tag </{name}> has no opening tag"
                        )));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(error) => return Err(MarkupError::Syntax(error.to_string())),
        }
    }

    if let Some(name) = open.pop() {
        return Err(MarkupError::Unclosed(name));
    }
    Ok(())
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_balanced_fragments() {
        assert_eq!(ensure_well_formed("<p>offline</p>"), Ok(()));
        assert_eq!(
            ensure_well_formed("<div><span>a</span><span>b</span></div>"),
            Ok(())
        );
        assert_eq!(ensure_well_formed("plain text"), Ok(()));
        assert_eq!(ensure_well_formed(""), Ok(()));
    }

    #[test]
    fn accepts_void_elements_without_closing_tags() {
        assert_eq!(ensure_well_formed("<p>line<br>break</p>"), Ok(()));
        assert_eq!(ensure_well_formed("<img src=\"/x.png\"/>"), Ok(()));
    }

    #[test]
    fn rejects_unclosed_tags() {
        assert_eq!(
            ensure_well_formed("<div><p>open</div>"),
            Err(MarkupError::Mismatched {
                expected: "p".to_string(),
                found: "div".to_string(),
            })
        );
        assert!(matches!(
            ensure_well_formed("<div>open"),
            Err(MarkupError::Unclosed(_))
        ));
    }

    #[test]
    fn rejects_stray_closing_tags() {
        assert!(matches!(
            ensure_well_formed("closed</p>"),
            Err(MarkupError::Syntax(_))
        ));
    }

    #[test]
    fn tag_matching_ignores_case() {
        assert_eq!(ensure_well_formed("<DIV>shout</div>"), Ok(()));
    }
}
