use std::fmt::Write;

const INDENT: &str = "  ";

/// Minimal XML element tree used for build exports.
///
/// Attributes keep insertion order; setting an existing attribute replaces
/// its value in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[XmlElement] {
        &self.children
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => self.attributes.push((key, value)),
        }
    }

    pub fn append(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// Serializes the tree on a single line, without trailing newline.
    pub fn to_compact_string(&self) -> String {
        let mut output = String::new();
        self.write_element(&mut output, None);
        output
    }

    /// Serializes the tree with two-space indentation and a trailing newline.
    pub fn to_pretty_string(&self) -> String {
        let mut output = String::new();
        self.write_element(&mut output, Some(0));
        output
    }

    fn write_element(&self, output: &mut String, depth: Option<usize>) {
        if let Some(depth) = depth {
            output.push_str(&INDENT.repeat(depth));
        }

        let _ = write!(output, "<{}", self.name);
        for (key, value) in &self.attributes {
            let _ = write!(output, " {}=\"{}\"", key, escape_attribute(value));
        }

        if self.children.is_empty() {
            output.push_str("/>");
        } else {
            output.push('>');
            if depth.is_some() {
                output.push('\n');
            }
            for child in &self.children {
                child.write_element(output, depth.map(|d| d + 1));
            }
            if let Some(depth) = depth {
                output.push_str(&INDENT.repeat(depth));
            }
            let _ = write!(output, "</{}>", self.name);
        }

        if depth.is_some() {
            output.push('\n');
        }
    }
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\n' => escaped.push_str("&#10;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders a number the way exports expect it: floats always carry a decimal point.
pub fn format_number(value: f64) -> String {
    format!("{value:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_element() {
        let element = XmlElement::new("stages");
        assert_eq!(element.to_compact_string(), "<stages/>");
        assert_eq!(element.to_pretty_string(), "<stages/>\n");
    }

    #[test]
    fn test_nested_pretty_print() {
        let mut stage = XmlElement::new("stage");
        stage.set("duration", "2.0");
        stage.set("name", "stage1");

        let mut stages = XmlElement::new("stages");
        stages.append(stage);

        let mut build = XmlElement::new("build");
        build.append(stages);

        assert_eq!(
            build.to_pretty_string(),
            "<build>\n  <stages>\n    <stage duration=\"2.0\" name=\"stage1\"/>\n  </stages>\n</build>\n"
        );
        assert_eq!(
            build.to_compact_string(),
            "<build><stages><stage duration=\"2.0\" name=\"stage1\"/></stages></build>"
        );
    }

    #[test]
    fn test_set_replaces_attribute() {
        let mut element = XmlElement::new("build");
        element.set("property1", "2");
        element.set("property1", "3");
        assert_eq!(element.attribute("property1"), Some("3"));
        assert_eq!(element.to_compact_string(), "<build property1=\"3\"/>");
    }

    #[test]
    fn test_attribute_escaping() {
        let mut element = XmlElement::new("stage");
        element.set("command", "make && echo \"<done>\"");
        assert_eq!(
            element.to_compact_string(),
            "<stage command=\"make &amp;&amp; echo &quot;&lt;done&gt;&quot;\"/>"
        );
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2.0), "2.0");
        assert_eq!(format_number(17.0), "17.0");
        assert_eq!(format_number(0.123_456_789), "0.123456789");
    }
}
