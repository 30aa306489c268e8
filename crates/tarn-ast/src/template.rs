//! Scanner for `${...}` string interpolation templates.
//!
//! A templated string is split into an ordered list of fragments, each
//! either raw text or the inner source of one `${...}` variable. A `\$`
//! escape produces a literal dollar sign.

use thiserror::Error;

/// Errors produced while scanning a template string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A `${` opened inside an unclosed variable fragment.
    #[error("invalid nesting in template: {0:?}")]
    InvalidNesting(String),
    /// The string ended inside a variable fragment.
    #[error("unterminated variable in template: {0:?}")]
    UnterminatedVariable(String),
}

/// One piece of a templated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    /// Raw text, or the source inside a `${...}` variable.
    pub value: String,
    /// True if this fragment is a `${...}` variable.
    pub is_variable: bool,
}

/// A parsed string template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// The original string.
    pub value: String,
    /// The fragments in order of appearance.
    pub fragments: Vec<Fragment>,
}

impl Template {
    /// Scans a string into its template fragments.
    pub fn parse(s: &str) -> Result<Template, TemplateError> {
        let chars: Vec<char> = s.chars().collect();
        let at = |index: isize| -> char {
            if index < 0 || index as usize >= chars.len() {
                '\0'
            } else {
                chars[index as usize]
            }
        };

        let mut fragments: Vec<Fragment> = Vec::new();
        // Index of the unfinished fragment, if any. A variable fragment
        // stays current until its closing brace is seen.
        let mut current: Option<usize> = None;

        let mut i: isize = 0;
        while (i as usize) < chars.len() {
            let mut ch = at(i);
            let prev = at(i - 1);
            let next = at(i + 1);
            if ch == '\\' && next == '$' {
                // Escaped $, so skip forward one and treat the $ as a literal
                ch = '$';
                i += 1;
            } else if ch == '$' {
                if prev != '\\' && next == '{' {
                    if let Some(index) = current {
                        if fragments[index].is_variable {
                            return Err(TemplateError::InvalidNesting(s.to_string()));
                        }
                    }
                    fragments.push(Fragment { value: String::new(), is_variable: true });
                    current = Some(fragments.len() - 1);
                    i += 2; // skip the following { character
                    continue;
                }
            } else if ch == '}' {
                if let Some(index) = current {
                    if fragments[index].is_variable {
                        current = None;
                        i += 1;
                        continue;
                    }
                }
            }
            let index = match current {
                Some(index) => index,
                None => {
                    fragments.push(Fragment { value: String::new(), is_variable: false });
                    current = Some(fragments.len() - 1);
                    fragments.len() - 1
                }
            };
            fragments[index].value.push(ch);
            i += 1;
        }

        if let Some(index) = current {
            if fragments[index].is_variable {
                return Err(TemplateError::UnterminatedVariable(s.to_string()));
            }
        }
        Ok(Template { value: s.to_string(), fragments })
    }

    /// The number of `${...}` variable fragments.
    pub fn variable_count(&self) -> usize {
        self.fragments.iter().filter(|f| f.is_variable).count()
    }
}
