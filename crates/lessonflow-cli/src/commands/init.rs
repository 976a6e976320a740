//! The `lessonflow init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    // Create lessonflow.toml
    if std::path::Path::new("lessonflow.toml").exists() {
        println!("lessonflow.toml already exists, skipping.");
    } else {
        std::fs::write("lessonflow.toml", SAMPLE_CONFIG)?;
        println!("Created lessonflow.toml");
    }

    // Create example lesson and script
    std::fs::create_dir_all("lessons")?;
    for (path, content) in [
        ("lessons/example.toml", EXAMPLE_LESSON),
        ("lessons/example-script.json", EXAMPLE_SCRIPT),
    ] {
        if std::path::Path::new(path).exists() {
            println!("{path} already exists, skipping.");
        } else {
            std::fs::write(path, content)?;
            println!("Created {path}");
        }
    }

    println!("\nNext steps:");
    println!("  1. Run: lessonflow validate --lesson lessons/example.toml");
    println!(
        "  2. Run: lessonflow play --lesson lessons/example.toml --script lessons/example-script.json"
    );
    println!("  3. Run: lessonflow stats --report lessonflow-results/<report>.json");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# lessonflow configuration

# Seed for random page jumps. Leave unset for a fresh seed per run.
# seed = 42

output_dir = "./lessonflow-results"

# Lesson settings used when a lesson file leaves them unset.
[defaults]
scoring = "custom"
max_attempts = 1
partial_credit = false
min_questions = 0
"#;

const EXAMPLE_LESSON: &str = r#"[lesson]
id = 1
name = "Example Lesson"
description = "A short lesson with a branch table"

[[pages]]
id = 1
kind = "truefalse"
title = "Warm-up"
contents = "Water boils at 100 degrees Celsius at sea level."

[[pages.answers]]
id = 11
text = "True"
response = "Right."
score = 1
jump = "next"

[[pages.answers]]
id = 12
text = "False"
response = "Have another look."
jump = "this"

[[pages]]
id = 2
kind = "branchtable"
title = "Choose a topic"

[[pages.answers]]
id = 21
text = "Liquids"
jump = 3

[[pages.answers]]
id = 22
text = "Gases"
jump = 5

[[pages]]
id = 3
kind = "cloze"
title = "Liquids"
contents = 'Ice melts at <a class="cloze" id="cloze-1"></a> degrees.'

[[pages.answers]]
id = 31
text = "=0, zero"
response = "Correct."
score = 1

[[pages]]
id = 4
kind = "endofbranch"
title = "End of liquids"

[[pages.answers]]
jump = 7

[[pages]]
id = 5
kind = "essay"
title = "Gases"
contents = "Why does a balloon shrink in the cold?"

[[pages.answers]]
score = 1

[[pages]]
id = 6
kind = "endofbranch"
title = "End of gases"

[[pages.answers]]
jump = 7

[[pages]]
id = 7
kind = "description"
title = "Wrap-up"
contents = "Describe one thing you learned."

[[pages.answers]]
jump = "end"
"#;

const EXAMPLE_SCRIPT: &str = r#"[
  { "choice": 11 },
  { "choice": 21 },
  { "fills": ["0"] },
  "continue",
  { "text": "Temperature changes state." }
]
"#;
