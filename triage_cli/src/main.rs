use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use triage_core::*;

#[derive(Parser)]
#[command(name = "triage")]
#[command(about = "Symptom triage dialog", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding health_problems.json, questions.json and solutions.json
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Describe symptoms and answer questions (default)
    Chat {
        /// Symptom description; prompted for when omitted
        #[arg(long)]
        message: Option<String>,

        /// Scripted answers as option numbers, e.g. "2,1"
        #[arg(long, value_delimiter = ',')]
        answers: Option<Vec<usize>>,

        /// Session id; a random one is generated when omitted
        #[arg(long)]
        session_id: Option<String>,

        /// Print every outcome as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// List known health problems in catalog order
    List,

    /// Validate the catalog and report its size
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    triage_core::logging::init_with_level(&config.logging.level);

    let data_dir = cli.data_dir.or_else(|| config.catalog.data_dir.clone());
    let catalog = load_catalog(data_dir.as_deref())?;

    let command = cli.command.unwrap_or(Commands::Chat {
        message: None,
        answers: None,
        session_id: None,
        json: false,
    });

    match command {
        Commands::Chat {
            message,
            answers,
            session_id,
            json,
        } => {
            let service = TriageService::with_options(
                Arc::new(catalog),
                Arc::new(SessionRegistry::new()),
                config.sessions.service_options(),
            );
            let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            cmd_chat(&service, &session_id, message, answers, json)
        }
        Commands::List => cmd_list(&catalog),
        Commands::Check => cmd_check(&catalog),
    }
}

fn load_catalog(data_dir: Option<&Path>) -> Result<Catalog> {
    let catalog = match data_dir {
        Some(dir) => Catalog::load_from_dir(dir)?,
        None => get_default_catalog().clone(),
    };

    let errors = catalog.validate();
    if !errors.is_empty() {
        eprintln!("Catalog validation errors:");
        for error in errors {
            eprintln!("  - {}", error);
        }
        return Err(Error::CatalogValidation("Invalid catalog".into()));
    }
    Ok(catalog)
}

fn cmd_list(catalog: &Catalog) -> Result<()> {
    for id in catalog.problem_ids() {
        println!("{}", id);
    }
    Ok(())
}

fn cmd_check(catalog: &Catalog) -> Result<()> {
    println!(
        "✓ Catalog OK: {} problems, {} question lists, {} rulesets",
        catalog.problems.len(),
        catalog.questions.len(),
        catalog.rulesets.len()
    );
    Ok(())
}

/// Where answers come from: a script or the terminal
enum AnswerSource {
    Scripted(std::vec::IntoIter<usize>),
    Stdin,
}

fn cmd_chat(
    service: &TriageService,
    session_id: &str,
    message: Option<String>,
    answers: Option<Vec<usize>>,
    json: bool,
) -> Result<()> {
    let message = match message {
        Some(m) => m,
        None => match prompt_line("Describe your symptoms: ", json)? {
            Some(m) => m,
            None => return Ok(()),
        },
    };

    tracing::debug!("Starting chat session '{}'", session_id);

    let mut source = match answers {
        Some(answers) => AnswerSource::Scripted(answers.into_iter()),
        None => AnswerSource::Stdin,
    };

    let outcome = service.identify(session_id, &message)?;
    if json {
        print_json(&outcome)?;
    } else {
        display_identify(&outcome);
    }

    let IdentifyOutcome::Question { mut question, .. } = outcome else {
        return Ok(());
    };

    loop {
        let Some(number) = next_answer(&mut source, &question, json)? else {
            let notice = "No more answers; the session was left unfinished.";
            if json {
                eprintln!("{}", notice);
            } else {
                println!("\n{}", notice);
            }
            return Ok(());
        };

        let Some(index) = number.checked_sub(1) else {
            eprintln!("Invalid answer: options are numbered from 1");
            continue;
        };

        let outcome = match service.submit_answer(session_id, index) {
            Ok(outcome) => outcome,
            Err(Error::InvalidIndex { options, .. }) => {
                eprintln!(
                    "Invalid answer {}: choose a number between 1 and {}",
                    number, options
                );
                continue;
            }
            Err(e) => return Err(e),
        };

        if json {
            print_json(&outcome)?;
        } else {
            display_answer(&outcome);
        }

        match outcome {
            AnswerOutcome::Question { question: next } => question = next,
            _ => return Ok(()),
        }
    }
}

fn next_answer(
    source: &mut AnswerSource,
    question: &QuestionPrompt,
    json: bool,
) -> Result<Option<usize>> {
    match source {
        AnswerSource::Scripted(answers) => Ok(answers.next()),
        AnswerSource::Stdin => loop {
            let prompt = format!("Your answer (1-{}): ", question.options.len());
            let Some(line) = prompt_line(&prompt, json)? else {
                return Ok(None);
            };
            match line.parse::<usize>() {
                Ok(n) => return Ok(Some(n)),
                Err(_) => eprintln!("Please enter the number of an option"),
            }
        },
    }
}

/// Read one trimmed line from stdin; `None` at end of input
///
/// With `json` the prompt goes to stderr so stdout stays one JSON value per
/// line.
fn prompt_line(prompt: &str, json: bool) -> Result<Option<String>> {
    if json {
        eprint!("{}", prompt);
        io::stderr().flush()?;
    } else {
        print!("{}", prompt);
        io::stdout().flush()?;
    }

    let mut input = String::new();
    if io::stdin().lock().read_line(&mut input)? == 0 {
        return Ok(None);
    }
    Ok(Some(input.trim().to_string()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn display_identify(outcome: &IdentifyOutcome) {
    match outcome {
        IdentifyOutcome::Unmatched { message } => println!("{}", message),
        IdentifyOutcome::NoQuestions { message, .. } => println!("{}", message),
        IdentifyOutcome::Question {
            message, question, ..
        } => {
            println!("{}", message);
            display_question(question);
        }
    }
}

fn display_question(question: &QuestionPrompt) {
    println!();
    println!(
        "Question {} of {}: {}",
        question.question_number, question.total_questions, question.question
    );
    for (i, option) in question.options.iter().enumerate() {
        println!("  {}. {}", i + 1, option.label);
    }
}

fn display_answer(outcome: &AnswerOutcome) {
    match outcome {
        AnswerOutcome::Question { question } => display_question(question),
        AnswerOutcome::Prescription {
            health_problem,
            prescription,
        } => display_prescription(health_problem, prescription),
        AnswerOutcome::PrescriptionUnavailable { message, .. } => {
            println!("\n{}", message)
        }
        AnswerOutcome::SessionNotFound { message } => println!("\n{}", message),
    }
}

fn display_prescription(health_problem: &str, prescription: &Prescription) {
    println!("\n╭─────────────────────────────────────────╮");
    println!("│  PRESCRIPTION: {}", health_problem);
    println!("╰─────────────────────────────────────────╯");
    println!();

    if let Some(text) = prescription.as_text() {
        println!("  {}", text);
    } else if let serde_json::Value::Object(fields) = &prescription.0 {
        for (key, value) in fields {
            match value.as_str() {
                Some(text) => println!("  {}: {}", key, text),
                None => println!("  {}: {}", key, value),
            }
        }
    } else {
        println!("  {}", prescription.0);
    }

    println!();
    println!("  This is general guidance, not a diagnosis.");
}
