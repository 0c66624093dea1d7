//! Script fixtures for the in-memory host.

/// Builds one 10 x 20 x 30 box and fits the view.
pub const BOX_SCRIPT: &str = r#"
let doc = App.active_document();
doc.add_object("Box", Part::make_box(10, 20, 30));
doc.recompute();
Gui.fit_view();
"#;

/// Same as [`BOX_SCRIPT`], wrapped in a markdown fence with a language tag.
pub const FENCED_BOX_SCRIPT: &str = "```rhai
let doc = App.active_document();
doc.add_object(\"Box\", Part::make_box(10, 20, 30));
```";

/// Creates an object, then divides by zero.
pub const DIVIDE_BY_ZERO_SCRIPT: &str = r#"
let doc = App.active_document();
doc.add_object("Box", Part::make_box(1, 1, 1));
let empty = doc.object_count() - 1;
let ratio = 10 / empty;
"#;

/// Touches the file system through the host root.
pub const FILE_REMOVAL_SCRIPT: &str = "App.removeFile('x')";

/// Never terminates on its own.
pub const RUNAWAY_SCRIPT: &str = "let n = 0; loop { n += 1; }";
