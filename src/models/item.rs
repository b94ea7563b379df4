use std::rc::Rc;

/// Zero-argument producer of a menu entry's value.
///
/// `None` means production failed or was declined; setting `None` is a
/// silent no-op downstream.
pub type ValueFn = Rc<dyn Fn() -> Option<String>>;

/// Zero-argument producer of a nested item list, invoked lazily when the
/// corresponding menu entry is activated, never eagerly.
pub type SubmenuFn = Rc<dyn Fn() -> Vec<Item>>;

/// Tagged producer variant: a leaf value or a lazy submenu.
#[derive(Clone)]
pub enum Producer {
    Value(ValueFn),
    Submenu(SubmenuFn),
}

impl Producer {
    /// Wrap a closure as a leaf value producer.
    pub fn value<F>(f: F) -> Self
    where
        F: Fn() -> Option<String> + 'static,
    {
        Producer::Value(Rc::new(f))
    }

    /// A leaf producer yielding a fixed string.
    pub fn fixed(text: impl Into<String>) -> Self {
        let text = text.into();
        Producer::Value(Rc::new(move || Some(text.clone())))
    }

    /// Wrap a closure as a lazy submenu producer.
    pub fn submenu<F>(f: F) -> Self
    where
        F: Fn() -> Vec<Item> + 'static,
    {
        Producer::Submenu(Rc::new(f))
    }

    pub fn is_submenu(&self) -> bool {
        matches!(self, Producer::Submenu(_))
    }
}

/// One entry of a picker menu: a config-supplied label and its producer.
#[derive(Clone)]
pub struct Item {
    pub label: String,
    pub producer: Producer,
}

impl Item {
    pub fn new(label: impl Into<String>, producer: Producer) -> Self {
        Item {
            label: label.into(),
            producer,
        }
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("label", &self.label)
            .field("submenu", &self.producer.is_submenu())
            .finish()
    }
}

/// Where to cut an over-long label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OmitMode {
    /// Keep the tail.
    Start,
    /// Keep head and tail, ellipsis between.
    #[default]
    Middle,
    /// Keep the head.
    End,
}

impl OmitMode {
    /// Parse a config value; anything unrecognized falls back to `Middle`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "start" => OmitMode::Start,
            "end" => OmitMode::End,
            _ => OmitMode::Middle,
        }
    }
}

const ELLIPSIS: &str = " ... ";

/// Label rendering policy: whitespace collapsing plus bounded shortening.
#[derive(Debug, Clone, Copy)]
pub struct Truncation {
    pub line_length: usize,
    pub omit_mode: OmitMode,
}

impl Default for Truncation {
    fn default() -> Self {
        Truncation {
            line_length: 30,
            omit_mode: OmitMode::Middle,
        }
    }
}

impl Truncation {
    pub fn new(line_length: usize, omit_mode: OmitMode) -> Self {
        Truncation {
            line_length,
            omit_mode,
        }
    }

    /// Render `text` as a menu label: internal whitespace runs collapse to
    /// single spaces, ends are trimmed, and anything longer than
    /// `line_length` characters is shortened per `omit_mode`.
    pub fn printable(&self, text: &str) -> String {
        let clean: Vec<&str> = text.split_whitespace().collect();
        let clean = clean.join(" ");

        let chars: Vec<char> = clean.chars().collect();
        let ll = self.line_length;
        if chars.len() <= ll {
            return clean;
        }

        match self.omit_mode {
            OmitMode::Start => chars[chars.len() - ll..].iter().collect(),
            OmitMode::End => chars[..ll].iter().collect(),
            OmitMode::Middle => {
                // Odd limits give the extra character to the tail.
                let head: String = chars[..ll / 2].iter().collect();
                let tail: String = chars[chars.len() - (ll - ll / 2)..].iter().collect();
                format!("{}{}{}", head, ELLIPSIS, tail)
            }
        }
    }
}
