//! Instance scanner for STEP physical files (ISO 10303-21).
//!
//! Finds `#<id>=<TYPE>(...);` statements in the DATA section with memchr's
//! substring search, without building a full attribute tree. Attributes are
//! read on demand through [`split_attributes`], [`references`] and
//! [`string_value`].

use memchr::memmem;
use serde::{Deserialize, Serialize};

/// One simple instance statement. `args` excludes the outer parentheses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInstance<'a> {
    pub id: u64,
    pub type_name: &'a str,
    pub args: &'a str,
    pub offset: usize,
    /// Position just past the closing `;`.
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scanned<'a> {
    Instance(RawInstance<'a>),
    /// A statement that starts like an instance but could not be read.
    Unreadable { offset: usize, reason: &'static str },
}

/// Byte span of one instance in the source, persisted as the cache index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: u64,
    pub start: usize,
    pub len: usize,
}

pub struct InstanceScanner<'a> {
    content: &'a str,
    pos: usize,
    end: usize,
}

impl<'a> InstanceScanner<'a> {
    /// `None` when the content has no DATA section.
    pub fn new(content: &'a str) -> Option<Self> {
        let bytes = content.as_bytes();
        let data = memmem::find(bytes, b"DATA;")? + "DATA;".len();
        let end = memmem::find(&bytes[data..], b"ENDSEC;")
            .map(|p| data + p)
            .unwrap_or(bytes.len());
        Some(Self {
            content,
            pos: data,
            end,
        })
    }

    fn skip_blanks(&mut self) {
        let bytes = self.content.as_bytes();
        while self.pos < self.end && matches!(bytes[self.pos], b' ' | b'\t' | b'\r' | b'\n') {
            self.pos += 1;
        }
    }

    /// Advance past the `;` closing the current statement, respecting quoted
    /// strings. Returns the position of the `;`.
    fn find_statement_end(&mut self) -> Option<usize> {
        let bytes = self.content.as_bytes();
        let mut in_string = false;
        while self.pos < self.end {
            match bytes[self.pos] {
                b'\'' => {
                    if in_string && self.pos + 1 < self.end && bytes[self.pos + 1] == b'\'' {
                        self.pos += 2;
                        continue;
                    }
                    in_string = !in_string;
                }
                b';' if !in_string => {
                    let semi = self.pos;
                    self.pos += 1;
                    return Some(semi);
                }
                _ => {}
            }
            self.pos += 1;
        }
        None
    }

    fn unreadable(&mut self, offset: usize, reason: &'static str) -> Scanned<'a> {
        if self.find_statement_end().is_none() {
            self.pos = self.end;
        }
        Scanned::Unreadable { offset, reason }
    }

    /// Byte spans of every readable instance.
    pub fn build_index(content: &'a str) -> Vec<IndexEntry> {
        let Some(scanner) = Self::new(content) else {
            return Vec::new();
        };
        scanner
            .filter_map(|s| match s {
                Scanned::Instance(i) => Some(i),
                Scanned::Unreadable { .. } => None,
            })
            .map(|i| IndexEntry {
                id: i.id,
                start: i.offset,
                len: i.end - i.offset,
            })
            .collect()
    }
}

impl<'a> Iterator for InstanceScanner<'a> {
    type Item = Scanned<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes = self.content.as_bytes();
        loop {
            self.skip_blanks();
            if self.pos >= self.end {
                return None;
            }
            if bytes[self.pos..self.end].starts_with(b"/*") {
                self.pos = memmem::find(&bytes[self.pos..self.end], b"*/")
                    .map(|p| self.pos + p + 2)
                    .unwrap_or(self.end);
                continue;
            }
            if bytes[self.pos] != b'#' {
                let offset = self.pos;
                return Some(self.unreadable(offset, "text outside an instance"));
            }

            let start = self.pos;
            self.pos += 1;
            let id_start = self.pos;
            while self.pos < self.end && bytes[self.pos].is_ascii_digit() {
                self.pos += 1;
            }
            let Ok(id) = self.content[id_start..self.pos].parse::<u64>() else {
                return Some(self.unreadable(start, "missing instance id"));
            };

            self.skip_blanks();
            if self.pos >= self.end || bytes[self.pos] != b'=' {
                return Some(self.unreadable(start, "expected '=' after instance id"));
            }
            self.pos += 1;
            self.skip_blanks();

            let type_start = self.pos;
            while self.pos < self.end
                && (bytes[self.pos].is_ascii_alphanumeric() || bytes[self.pos] == b'_')
            {
                self.pos += 1;
            }
            if self.pos == type_start {
                return Some(self.unreadable(start, "complex instances are not supported"));
            }
            let type_name = &self.content[type_start..self.pos];

            self.skip_blanks();
            if self.pos >= self.end || bytes[self.pos] != b'(' {
                return Some(self.unreadable(start, "expected '(' after type name"));
            }
            let open = self.pos;
            let Some(semi) = self.find_statement_end() else {
                self.pos = self.end;
                return Some(Scanned::Unreadable {
                    offset: start,
                    reason: "unterminated instance",
                });
            };
            let body = self.content[open..semi].trim_end();
            let Some(args) = body.strip_prefix('(').and_then(|b| b.strip_suffix(')')) else {
                return Some(Scanned::Unreadable {
                    offset: start,
                    reason: "unbalanced parentheses",
                });
            };
            return Some(Scanned::Instance(RawInstance {
                id,
                type_name,
                args,
                offset: start,
                end: semi + 1,
            }));
        }
    }
}

/// Split an argument list on top-level commas. Nested lists and quoted
/// strings stay intact; each attribute is trimmed.
pub fn split_attributes(args: &str) -> Vec<&str> {
    let bytes = args.as_bytes();
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut from = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                if in_string && i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                    i += 2;
                    continue;
                }
                in_string = !in_string;
            }
            b'(' if !in_string => depth += 1,
            b')' if !in_string => depth = depth.saturating_sub(1),
            b',' if !in_string && depth == 0 => {
                out.push(args[from..i].trim());
                from = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    let last = args[from..].trim();
    if !last.is_empty() || !out.is_empty() {
        out.push(last);
    }
    out
}

/// Instance references (`#<id>`) in `s`, outside quoted strings.
pub fn references(s: &str) -> Vec<u64> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_string = !in_string,
            b'#' if !in_string => {
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    j += 1;
                }
                if let Ok(id) = s[start..j].parse() {
                    out.push(id);
                }
                i = j;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    out
}

/// Value of a quoted STEP string attribute. `$` and non-strings give `None`.
pub fn string_value(attr: &str) -> Option<String> {
    let inner = attr.trim().strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("''", "'"))
}

/// Parse one quoted string at the start of `s`, returning it and the rest.
fn header_string(s: &str) -> Option<(String, &str)> {
    let s = s.trim_start();
    if let Some(rest) = s.strip_prefix('$') {
        return Some((String::new(), rest));
    }
    let body = s.strip_prefix('\'')?;
    let bytes = body.as_bytes();
    let mut end = 0;
    while end < bytes.len() {
        if bytes[end] == b'\'' {
            if end + 1 < bytes.len() && bytes[end + 1] == b'\'' {
                end += 2;
                continue;
            }
            break;
        }
        end += 1;
    }
    let value = body[..end].replace("''", "'");
    Some((value, body.get(end + 1..).unwrap_or("")))
}

/// Parse a parenthesised list of strings at the start of `s`.
fn header_list(s: &str) -> Option<(Vec<String>, &str)> {
    let mut rest = s.trim_start().strip_prefix('(')?;
    let mut items = Vec::new();
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix(')') {
            return Some((items, after));
        }
        let (item, after) = header_string(rest)?;
        if !item.is_empty() {
            items.push(item);
        }
        rest = after.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after;
        }
    }
}

/// Arguments of the header entity `name`, starting after its `(`.
fn header_entity<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    let at = header.find(name)?;
    let after = &header[at + name.len()..];
    after.trim_start().strip_prefix('(')
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepHeader {
    pub descriptions: Vec<String>,
    pub implementation_level: Option<String>,
    pub name: Option<String>,
    pub schemas: Vec<String>,
}

pub fn parse_header(content: &str) -> StepHeader {
    let mut info = StepHeader::default();
    let start = content.find("HEADER;").unwrap_or(0);
    let end = content[start..]
        .find("ENDSEC;")
        .map(|p| start + p)
        .unwrap_or(content.len());
    let header = &content[start..end];

    if let Some(args) = header_entity(header, "FILE_DESCRIPTION") {
        if let Some((descriptions, rest)) = header_list(args) {
            info.descriptions = descriptions;
            if let Some(rest) = rest.trim_start().strip_prefix(',') {
                info.implementation_level = header_string(rest)
                    .map(|(level, _)| level)
                    .filter(|l| !l.is_empty());
            }
        }
    }
    if let Some(args) = header_entity(header, "FILE_NAME") {
        info.name = header_string(args)
            .map(|(name, _)| name)
            .filter(|n| !n.is_empty());
    }
    if let Some(args) = header_entity(header, "FILE_SCHEMA") {
        if let Some((schemas, _)) = header_list(args) {
            info.schemas = schemas;
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');
FILE_NAME('test.ifc','2024-01-01T00:00:00',('Author'),('Org'),'Preprocessor','App','');
FILE_SCHEMA(('IFC2X3'));
ENDSEC;
DATA;
#1=IFCPROJECT('guid',$,'Project',$,$,$,$,$,#2);
#2=IFCUNITASSIGNMENT((#3));
#3= IFCSIUNIT(*,.LENGTHUNIT.,.MILLI.,.METRE.);
#4=IFCWALL('guid',$,'Wall; #9 (not a ref)',$,$,#5,#6,$);
ENDSEC;
END-ISO-10303-21;
"#;

    fn instances(content: &str) -> Vec<RawInstance<'_>> {
        InstanceScanner::new(content)
            .unwrap()
            .filter_map(|s| match s {
                Scanned::Instance(i) => Some(i),
                Scanned::Unreadable { .. } => None,
            })
            .collect()
    }

    #[test]
    fn scans_instances_quote_aware() {
        let all = instances(SAMPLE);
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].id, 1);
        assert_eq!(all[0].type_name, "IFCPROJECT");
        assert_eq!(all[2].type_name, "IFCSIUNIT");
        assert_eq!(all[3].args, "'guid',$,'Wall; #9 (not a ref)',$,$,#5,#6,$");
        assert_eq!(references(all[3].args), vec![5, 6]);
    }

    #[test]
    fn no_data_section() {
        assert!(InstanceScanner::new("ISO-10303-21;\nHEADER;\nENDSEC;\n").is_none());
    }

    #[test]
    fn unreadable_statements_are_reported_and_skipped() {
        let content = "DATA;\n#1 IFCWALL($);\n/* note */\n#2=(IFCA()IFCB());\n#3=IFCSLAB($);\nENDSEC;";
        let scanned: Vec<Scanned<'_>> = InstanceScanner::new(content).unwrap().collect();
        assert_eq!(scanned.len(), 3);
        assert!(matches!(scanned[0], Scanned::Unreadable { .. }));
        assert!(matches!(scanned[1], Scanned::Unreadable { .. }));
        assert!(matches!(scanned[2], Scanned::Instance(RawInstance { id: 3, .. })));
    }

    #[test]
    fn unterminated_instance_ends_scan() {
        let content = "DATA;\n#1=IFCWALL('open";
        let scanned: Vec<Scanned<'_>> = InstanceScanner::new(content).unwrap().collect();
        assert_eq!(
            scanned,
            vec![Scanned::Unreadable {
                offset: 6,
                reason: "unterminated instance"
            }]
        );
    }

    #[test]
    fn splits_nested_attributes() {
        let attrs = split_attributes("#7,'Body','Swept, Solid',(#10,#11),$");
        assert_eq!(attrs, vec!["#7", "'Body'", "'Swept, Solid'", "(#10,#11)", "$"]);
        assert!(split_attributes("").is_empty());
        assert_eq!(string_value("'It''s'"), Some("It's".to_string()));
        assert_eq!(string_value("$"), None);
    }

    #[test]
    fn parses_header() {
        let h = parse_header(SAMPLE);
        assert_eq!(h.descriptions, vec!["ViewDefinition [CoordinationView]".to_string()]);
        assert_eq!(h.implementation_level.as_deref(), Some("2;1"));
        assert_eq!(h.name.as_deref(), Some("test.ifc"));
        assert_eq!(h.schemas, vec!["IFC2X3".to_string()]);
    }

    #[test]
    fn index_covers_readable_instances() {
        let index = InstanceScanner::build_index(SAMPLE);
        let ids: Vec<u64> = index.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert!(SAMPLE[index[0].start..].starts_with("#1=IFCPROJECT"));
    }
}
