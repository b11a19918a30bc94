use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Bold,
    Italic,
    Underline,
    Strike,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Open(Mark),
    Close(Mark),
    Break,
    Ignore,
}

const TAGS: &[(&str, Tag)] = &[
    ("<strong>", Tag::Open(Mark::Bold)),
    ("</strong>", Tag::Close(Mark::Bold)),
    ("<em>", Tag::Open(Mark::Italic)),
    ("</em>", Tag::Close(Mark::Italic)),
    ("<u>", Tag::Open(Mark::Underline)),
    ("</u>", Tag::Close(Mark::Underline)),
    ("<s>", Tag::Open(Mark::Strike)),
    ("</s>", Tag::Close(Mark::Strike)),
    ("<code>", Tag::Open(Mark::Code)),
    ("</code>", Tag::Close(Mark::Code)),
    ("<pre>", Tag::Ignore),
    ("</pre>", Tag::Ignore),
    ("<br/>", Tag::Break),
];

/// Open counts per mark; counts rather than a stack since emphasis tags
/// can come out crossed (`<strong><em>x</strong></em>`).
#[derive(Debug, Default)]
struct Marks([u16; 5]);

impl Marks {
    fn slot(mark: Mark) -> usize {
        match mark {
            Mark::Bold => 0,
            Mark::Italic => 1,
            Mark::Underline => 2,
            Mark::Strike => 3,
            Mark::Code => 4,
        }
    }

    fn open(&mut self, mark: Mark) {
        self.0[Self::slot(mark)] += 1;
    }

    fn close(&mut self, mark: Mark) {
        let slot = &mut self.0[Self::slot(mark)];
        *slot = slot.saturating_sub(1);
    }

    fn active(&self, mark: Mark) -> bool {
        self.0[Self::slot(mark)] > 0
    }

    fn style(&self, base: Style) -> Style {
        let mut style = base;
        if self.active(Mark::Bold) {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.active(Mark::Italic) {
            style = style.add_modifier(Modifier::ITALIC);
        }
        if self.active(Mark::Underline) {
            style = style.add_modifier(Modifier::UNDERLINED);
        }
        if self.active(Mark::Strike) {
            style = style.add_modifier(Modifier::CROSSED_OUT);
        }
        if self.active(Mark::Code) {
            style = style.fg(Color::Yellow);
        }
        style
    }
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Render formatter output as terminal lines. Unknown `<` sequences are
/// plain text, since only code interiors were escaped upstream.
pub fn markup_to_lines(markup: &str, base: Style) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut buffer = String::new();
    let mut marks = Marks::default();

    let flush = |buffer: &mut String, spans: &mut Vec<Span<'static>>, marks: &Marks| {
        if buffer.is_empty() {
            return;
        }
        let text = if marks.active(Mark::Code) {
            unescape(buffer)
        } else {
            buffer.clone()
        };
        spans.push(Span::styled(text, marks.style(base)));
        buffer.clear();
    };

    let mut rest = markup;
    while let Some(pos) = rest.find('<') {
        buffer.push_str(&rest[..pos]);
        rest = &rest[pos..];

        match TAGS.iter().find(|(tag, _)| rest.starts_with(tag)) {
            Some((tag, kind)) => {
                flush(&mut buffer, &mut spans, &marks);
                match kind {
                    Tag::Open(mark) => marks.open(*mark),
                    Tag::Close(mark) => marks.close(*mark),
                    Tag::Break => lines.push(Line::from(std::mem::take(&mut spans))),
                    Tag::Ignore => {}
                }
                rest = &rest[tag.len()..];
            }
            None => {
                buffer.push('<');
                rest = &rest[1..];
            }
        }
    }
    buffer.push_str(rest);
    flush(&mut buffer, &mut spans, &marks);
    lines.push(Line::from(spans));
    lines
}
