//! Static policy check tests over the builtin rule table.

use modelsmith_config::{ModelsmithConfig, PolicyConfig, PolicyRuleConfig};
use modelsmith_protocol::{PolicyCategory, PolicyVerdict};
use modelsmith_sandbox::{CodeSandbox, MemoryHost, PolicyRuleSet};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn denied_category(code: &str) -> Option<PolicyCategory> {
    PolicyRuleSet::builtin()
        .check(code)
        .violation()
        .map(|violation| violation.category)
}

/// Every sample must be denied with its own category.
#[test]
fn each_category_is_detected() {
    let samples = [
        (PolicyCategory::FileSystem, r#"let f = open("/etc/passwd");"#),
        (PolicyCategory::FileSystem, r#"os.remove("model.step")"#),
        (PolicyCategory::FileSystem, r#"shutil.rmtree("/")"#),
        (PolicyCategory::FileSystem, "App.removeFile('x')"),
        (PolicyCategory::ProcessControl, r#"subprocess.run(["ls"])"#),
        (PolicyCategory::ProcessControl, r#"os.system("rm -rf ~")"#),
        (PolicyCategory::ProcessControl, "sys.exit(0)"),
        (PolicyCategory::Network, r#"requests.get("x")"#),
        (PolicyCategory::Network, "import socket"),
        (PolicyCategory::Network, "urllib.request.urlopen(u)"),
        (PolicyCategory::Network, r#"let url = "https://example.com";"#),
        (PolicyCategory::Reflection, r#"eval("1 + 1")"#),
        (PolicyCategory::Reflection, "exec(code)"),
        (PolicyCategory::Reflection, r#"__import__("os")"#),
        (PolicyCategory::Reflection, r#"getattr(App, "secret")"#),
        (PolicyCategory::Reflection, "let g = globals();"),
        (PolicyCategory::Reflection, r#"let f = Fn("make_box");"#),
        (
            PolicyCategory::SelfReference,
            "import google.generativeai as genai",
        ),
        (PolicyCategory::SelfReference, "openai.ChatCompletion.create()"),
        (
            PolicyCategory::SelfReference,
            r#"model.generate_content("more code")"#,
        ),
    ];
    for (category, code) in samples {
        assert_eq!(denied_category(code), Some(category), "{code}");
    }
}

/// The classic blocklist of dangerous call spellings stays covered.
#[test]
fn legacy_blocklist_spellings_are_denied() {
    use PolicyCategory::*;
    let samples = [
        ("open('x')", FileSystem),
        ("os.open('x', 0)", FileSystem),
        ("os.fdopen(3, 'w')", FileSystem),
        ("tempfile.NamedTemporaryFile()", FileSystem),
        ("file('x')", FileSystem),
        ("os.remove('x')", FileSystem),
        ("os.unlink('x')", FileSystem),
        ("os.rmdir('x')", FileSystem),
        ("os.makedirs('x')", FileSystem),
        ("shutil.rmtree('x')", FileSystem),
        ("shutil.move('a', 'b')", FileSystem),
        ("subprocess.call(cmd)", ProcessControl),
        ("os.system('ls')", ProcessControl),
        ("os.popen('ls')", ProcessControl),
        ("popen2.popen3", ProcessControl),
        ("commands.getoutput", ProcessControl),
        ("os.fork()", ProcessControl),
        ("os.spawn(mode)", ProcessControl),
        ("os._exit(0)", ProcessControl),
        ("exit(1)", ProcessControl),
        ("sys.exit(1)", ProcessControl),
        ("quit()", ProcessControl),
        ("requests.get(u)", Network),
        ("requests.post(u)", Network),
        ("urllib.request.Request", Network),
        ("http.client.HTTPConnection", Network),
        ("socket.create_connection", Network),
        ("ftplib.FTP", Network),
        ("exec(s)", Reflection),
        ("eval(s)", Reflection),
        ("compile(s, 'f', 'exec')", Reflection),
        ("globals()", Reflection),
        ("locals()", Reflection),
        ("__import__('os')", Reflection),
        ("builtins.__dict__", Reflection),
        ("__builtins__", Reflection),
        ("delattr(App, 'x')", Reflection),
        ("setattr(App, 'x', 1)", Reflection),
        ("getattr(App, 'x')", Reflection),
        ("sys.modules", Reflection),
        ("google.generativeai", SelfReference),
    ];
    for (code, category) in samples {
        assert_eq!(denied_category(code), Some(category), "{code}");
    }
}

#[test]
fn modeling_scripts_are_allowed() {
    let scripts = [
        r#"
            let doc = App.active_document();
            let body = Part::make_box(10, 20, 30);
            doc.add_object("Box", body);
            doc.recompute();
            Gui.fit_view();
        "#,
        r#"
            let doc = App.active_document();
            let filename = "bracket";
            let plate = Sketch::extrude(Sketch::rectangle(40.0, 20.0), 5);
            doc.add_object(filename, plate.translate(0, 0, 10));
            print(`area=${Sketch::rectangle(40.0, 20.0).area()}`);
        "#,
    ];
    for script in scripts {
        assert_eq!(PolicyRuleSet::builtin().check(script), PolicyVerdict::Allowed);
    }
}

#[test]
fn shell_invocation_reports_process_control() {
    let verdict = PolicyRuleSet::builtin().check("os.popen('ls').read()");
    let violation = verdict.violation().expect("denied");
    assert_eq!(violation.category.to_string(), "process/OS control");
    assert_eq!(violation.matched_text, "os.popen(");
}

#[test]
fn configured_rules_extend_the_builtin_table() {
    let config = ModelsmithConfig::builder()
        .policy(PolicyConfig {
            extra_rules: vec![PolicyRuleConfig {
                id: "no-pickle".to_string(),
                category: PolicyCategory::Reflection,
                pattern: r"\bpickle\b".to_string(),
            }],
            ..PolicyConfig::default()
        })
        .build();
    let sandbox = CodeSandbox::new(Arc::new(MemoryHost::new()), &config).expect("sandbox");
    assert_eq!(sandbox.rules().len(), PolicyRuleSet::builtin().len() + 1);

    let verdict = sandbox.check("data = PICKLE.loads(blob)");
    assert_eq!(
        verdict.violation().map(|violation| violation.rule_id.as_str()),
        Some("no-pickle")
    );
    // Builtin rules still apply.
    assert!(!sandbox.check("open('x')").is_allowed());
}

#[test]
fn violations_lists_every_match() {
    let code = "import subprocess\nrequests.post(url)\neval(s)";
    let categories: Vec<_> = PolicyRuleSet::builtin()
        .violations(code)
        .into_iter()
        .map(|violation| violation.category)
        .collect();
    assert_eq!(
        categories,
        vec![
            PolicyCategory::ProcessControl,
            PolicyCategory::Network,
            PolicyCategory::Reflection,
        ]
    );
}
