use std::time::{Duration, Instant};

use quire::{
    Editor, EditorConfig, convert,
    editor::{ClipboardData, SelectionMarks, ToolbarCommand},
    engine::{EditorState, Selection, native::CaretMove},
    markup,
    render::Layout,
    theme::Theme,
};
use tdoc::{Document, InlineStyle, Paragraph, ParagraphType, Span};

/// Timings for the editing core and the terminal layout.
///
/// Run with: cargo test --release --bench performance -- --nocapture
const SMALL_DOC_PARAGRAPHS: usize = 10;
const MEDIUM_DOC_PARAGRAPHS: usize = 100;
const LARGE_DOC_PARAGRAPHS: usize = 1000;

const ITERATIONS: usize = 100;

const SAMPLE_WORDS: &[&str] = &[
    "Lorem",
    "ipsum",
    "dolor",
    "sit",
    "amet",
    "consectetur",
    "adipiscing",
    "elit",
    "sed",
    "do",
    "eiusmod",
    "tempor",
    "incididunt",
    "ut",
    "labore",
    "et",
    "dolore",
    "magna",
    "aliqua",
];

fn sample_text(words: usize) -> String {
    (0..words)
        .map(|j| SAMPLE_WORDS[j % SAMPLE_WORDS.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

fn create_test_document(num_paragraphs: usize, avg_words_per_para: usize) -> Document {
    let mut doc = Document::new();
    for i in 0..num_paragraphs {
        let paragraph_type = match i % 5 {
            0 => ParagraphType::Header2,
            1 => ParagraphType::Header3,
            3 => ParagraphType::CodeBlock,
            _ => ParagraphType::Text,
        };
        let text = sample_text(avg_words_per_para);
        let span = if i % 5 == 4 {
            Span::new_styled(InlineStyle::Bold).with_text(&text)
        } else {
            Span::new_text(&text)
        };
        let paragraph = Paragraph::new(paragraph_type).with_content(vec![span]);
        doc.add_paragraph(paragraph);
    }
    doc
}

fn create_styled_markup(num_paragraphs: usize) -> String {
    (0..num_paragraphs)
        .map(|i| match i % 4 {
            0 => format!("<p>Paragraph {i} with <strong>bold</strong> and <em>italic</em> text.</p>"),
            1 => format!("<ul><li>item {i}</li><li><a href=\"https://example.com/{i}\">link</a></li></ul>"),
            2 => format!("<p><mark style=\"background-color: yellow;\">marked {i}</mark></p>"),
            _ => "<hr>".to_string(),
        })
        .collect()
}

fn editor_for(doc: &Document) -> Editor {
    let tree = convert::document_to_tree(doc).unwrap();
    let mut editor = Editor::with_state(EditorConfig::default(), EditorState::new(tree));
    editor.place_cursor_at_the_end().unwrap();
    editor
}

struct BenchmarkResult {
    name: String,
    iterations: usize,
    total_duration: Duration,
    avg_duration: Duration,
    min_duration: Duration,
    max_duration: Duration,
}

impl BenchmarkResult {
    fn print(&self) {
        println!("\n{}", "=".repeat(70));
        println!("Benchmark: {}", self.name);
        println!("{}", "=".repeat(70));
        println!("Iterations:     {}", self.iterations);
        println!("Total time:     {:?}", self.total_duration);
        println!("Average:        {:?}", self.avg_duration);
        println!("Min:            {:?}", self.min_duration);
        println!("Max:            {:?}", self.max_duration);

        if self.avg_duration.as_millis() > 100 {
            println!("\nWARNING: Average duration > 100ms (user-perceptible lag)");
        } else if self.avg_duration.as_millis() > 16 {
            println!("\nWARNING: Average duration > 16ms (may drop frames)");
        }
    }
}

fn benchmark<F>(name: &str, iterations: usize, mut f: F) -> BenchmarkResult
where
    F: FnMut(),
{
    let mut durations = Vec::with_capacity(iterations);

    for _ in 0..10 {
        f();
    }

    for _ in 0..iterations {
        let start = Instant::now();
        f();
        durations.push(start.elapsed());
    }

    let total_duration: Duration = durations.iter().sum();
    let avg_duration = total_duration / iterations as u32;
    let min_duration = *durations.iter().min().unwrap();
    let max_duration = *durations.iter().max().unwrap();

    BenchmarkResult {
        name: name.to_string(),
        iterations,
        total_duration,
        avg_duration,
        min_duration,
        max_duration,
    }
}

#[test]
fn bench_layout_performance() {
    let theme = Theme::default();
    let marks = SelectionMarks::default();
    for (name, paragraphs) in [
        ("Small (10 paras)", SMALL_DOC_PARAGRAPHS),
        ("Medium (100 paras)", MEDIUM_DOC_PARAGRAPHS),
        ("Large (1000 paras)", LARGE_DOC_PARAGRAPHS),
    ] {
        let editor = editor_for(&create_test_document(paragraphs, 20));
        let iterations = if paragraphs >= LARGE_DOC_PARAGRAPHS { 10 } else { ITERATIONS };
        let result = benchmark(&format!("layout - {name}"), iterations, || {
            let layout = Layout::build(editor.tree(), editor.selection(), &marks, 80, &theme);
            assert!(layout.total_lines() > 0);
        });
        result.print();
    }
}

#[test]
fn bench_wrap_width_impact() {
    let theme = Theme::default();
    let marks = SelectionMarks::default();
    let editor = editor_for(&create_test_document(MEDIUM_DOC_PARAGRAPHS, 60));
    for width in [20, 40, 80, 160] {
        let result = benchmark(&format!("layout at width {width}"), ITERATIONS, || {
            Layout::build(editor.tree(), editor.selection(), &marks, width, &theme);
        });
        result.print();
    }
}

#[test]
fn bench_markup_round_trip() {
    let source = create_styled_markup(MEDIUM_DOC_PARAGRAPHS);
    let result = benchmark("parse + serialize markup (100 blocks)", ITERATIONS, || {
        let tree = markup::parse_document(&source).unwrap();
        let out = markup::to_markup(&tree);
        assert!(!out.is_empty());
    });
    result.print();
}

#[test]
fn bench_interchange_export() {
    let editor = editor_for(&create_test_document(MEDIUM_DOC_PARAGRAPHS, 20));
    let result = benchmark("export ftml + markdown (100 paras)", ITERATIONS, || {
        convert::to_ftml(editor.tree()).unwrap();
        convert::to_markdown(editor.tree()).unwrap();
    });
    result.print();
}

#[test]
fn bench_typing() {
    let mut editor = editor_for(&create_test_document(MEDIUM_DOC_PARAGRAPHS, 20));
    let result = benchmark("insert one character (100 paras)", ITERATIONS, || {
        editor.insert_text("x").unwrap();
    });
    result.print();
    assert!(editor.can_undo());
}

#[test]
fn bench_undo_redo() {
    let mut editor = Editor::new(EditorConfig::default().with_history_limit(1000));
    for _ in 0..200 {
        editor.insert_text("word ").unwrap();
    }
    let result = benchmark("undo + redo", ITERATIONS, || {
        editor.undo();
        editor.redo();
    });
    result.print();
}

#[test]
fn bench_caret_movement() {
    let mut editor = editor_for(&create_test_document(LARGE_DOC_PARAGRAPHS, 20));
    let result = benchmark("caret up + down (1000 paras)", ITERATIONS, || {
        editor.move_caret(CaretMove::Up, false).unwrap();
        editor.move_caret(CaretMove::Down, false).unwrap();
    });
    result.print();
    assert!(matches!(editor.selection(), Some(Selection::Range(_))));
}

#[test]
fn bench_toolbar_commands() {
    let mut editor = Editor::from_markup(EditorConfig::default(), &create_styled_markup(40)).unwrap();
    let result = benchmark("toggle list + quote", ITERATIONS, || {
        editor.run(ToolbarCommand::InsertUnorderedList).unwrap();
        editor.run(ToolbarCommand::InsertQuote).unwrap();
    });
    result.print();
}

#[test]
fn bench_markdown_paste() {
    let markdown = (0..50)
        .map(|i| format!("**item {i}** with `code` and _emphasis_\n\n"))
        .collect::<String>();
    let result = benchmark("paste 50 markdown paragraphs", 20, || {
        let mut editor = Editor::new(EditorConfig::default());
        editor.paste(ClipboardData::text(markdown.clone())).unwrap();
    });
    result.print();
}
