use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use clap::{Arg, ArgAction, ArgMatches, Command};
use ors_autograder::roster::{self, Roster};
use ors_autograder::{Config, GradingOutcome, GradingSession, SectionId, Upload};
use std::fs;
use std::path::{Path, PathBuf};

fn cli() -> Command {
    let roster_arg = Arg::new("roster")
        .short('r')
        .long("roster")
        .value_name("FILE")
        .help("Student information CSV (Section, Status, First Name, Last Name, Email)")
        .required(true);
    let section_arg = Arg::new("section")
        .short('s')
        .long("section")
        .value_name("SECTION")
        .help("Section you teach")
        .required(true);

    Command::new("ors-autograder")
        .version("1.0")
        .about("Grades office-suite assessment exports against a class roster")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config.toml")
                .global(true),
        )
        .subcommand(
            Command::new("sections")
                .about("List the sections found in a roster")
                .arg(roster_arg.clone()),
        )
        .subcommand(
            Command::new("roster")
                .about("Show the active students of a section and export them as CSV")
                .arg(roster_arg.clone())
                .arg(section_arg.clone())
                .arg(
                    Arg::new("out")
                        .short('o')
                        .long("out")
                        .value_name("FILE")
                        .help("Where to write the student info CSV"),
                ),
        )
        .subcommand(
            Command::new("grade")
                .about("Grade assessment exports and bundle the reports into a zip archive")
                .arg(roster_arg)
                .arg(section_arg)
                .arg(
                    Arg::new("student-info")
                        .long("student-info")
                        .help("The roster file is a previously exported student info CSV")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("out")
                        .short('o')
                        .long("out")
                        .value_name("FILE")
                        .help("Archive path (default: <output_directory>/Section<N>_reports.zip)"),
                )
                .arg(
                    Arg::new("since")
                        .long("since")
                        .value_name("YYYY-MM-DD")
                        .help("Only grade submissions on or after this date")
                        .value_parser(parse_date),
                )
                .arg(
                    Arg::new("all-dates")
                        .long("all-dates")
                        .help("Grade submissions from every date")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("since"),
                )
                .arg(
                    Arg::new("mask-correct")
                        .long("mask-correct")
                        .help("Replace correct answers with '-' so only mistakes stand out")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("assessments")
                        .value_name("ASSESSMENT")
                        .help(
                            "Assessment export CSVs; file names must contain \
                             word, excel or powerpoint/ppt",
                        )
                        .num_args(1..)
                        .required(true),
                ),
        )
}

fn main() -> Result<()> {
    let matches = cli().get_matches();
    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config.toml");

    let config = if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to load configuration: {}", config_file))?
    } else {
        println!("📝 Creating default configuration file: {}", config_file);
        let default_config = Config::default();
        default_config.save_to_file(config_file)?;
        default_config
    };

    match matches.subcommand() {
        Some(("sections", sub)) => list_sections(sub),
        Some(("roster", sub)) => export_roster(sub),
        Some(("grade", sub)) => grade(config, sub),
        _ => Err(anyhow!("no command given, see --help")),
    }
}

fn parse_date(raw: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {}", e))
}

fn required<'a>(matches: &'a ArgMatches, id: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(id)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing --{}", id))
}

fn read_roster(path: &str) -> Result<Roster> {
    println!("📂 Reading student information from: {}", path);
    Roster::from_path(Path::new(path)).with_context(|| format!("Failed to read roster: {}", path))
}

fn ensure_section(roster: &Roster, section: &SectionId) -> Result<()> {
    let sections = roster.sections();
    if sections.contains(section) {
        return Ok(());
    }
    let available: Vec<String> = sections.iter().map(SectionId::to_string).collect();
    Err(anyhow!(
        "Section {} not found. Available sections: {}",
        section,
        available.join(", ")
    ))
}

fn list_sections(matches: &ArgMatches) -> Result<()> {
    let roster = read_roster(required(matches, "roster")?)?;
    let sections = roster.sections();

    println!("📚 {} sections:", sections.len());
    for section in sections {
        let active = roster.section(&section).len();
        println!("   • Section {} ({} active students)", section, active);
    }
    Ok(())
}

fn export_roster(matches: &ArgMatches) -> Result<()> {
    let roster = read_roster(required(matches, "roster")?)?;
    let section = SectionId::new(required(matches, "section")?);
    ensure_section(&roster, &section)?;

    let students = roster.student_info(&section);
    println!("👥 Section {}: {} active students", section, students.len());
    for student in &students {
        println!("   {} {} <{}>", student.first_name, student.last_name, student.email);
    }
    warn_invalid_emails(&students);

    let out = matches
        .get_one::<String>("out")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(roster::student_info_file_name(&section)));
    let file = fs::File::create(&out)
        .with_context(|| format!("Failed to create {}", out.display()))?;
    roster::write_student_info(file, &students)?;

    println!("✅ Student info saved to: {}", out.display());
    Ok(())
}

fn warn_invalid_emails(students: &[ors_autograder::StudentInfo]) {
    for student in roster::invalid_emails(students) {
        println!(
            "   ⚠️  Invalid email for {} {}: '{}'",
            student.first_name, student.last_name, student.email
        );
    }
}

fn first_of_month() -> NaiveDate {
    let today = Local::now().date_naive();
    today.with_day(1).unwrap_or(today)
}

fn grade(mut config: Config, matches: &ArgMatches) -> Result<()> {
    if matches.get_flag("all-dates") {
        config.since = None;
        config.assessment_dates.clear();
    } else if let Some(since) = matches.get_one::<NaiveDate>("since") {
        config.since = Some(*since);
    } else if config.since.is_none() && config.assessment_dates.is_empty() {
        config.since = Some(first_of_month());
    }
    if matches.get_flag("mask-correct") {
        config.mask_correct_answers = true;
    }

    let roster_path = required(matches, "roster")?;
    let section = SectionId::new(required(matches, "section")?);
    let output_dir = config.output_directory.clone();
    let mut session = GradingSession::new(config);

    // Section roster
    let roster_upload = Upload::from_path(Path::new(roster_path))
        .with_context(|| format!("Failed to read roster: {}", roster_path))?;
    println!("📂 Reading student information from: {}", roster_path);
    if matches.get_flag("student-info") {
        session.load_student_info(section.clone(), &roster_upload)?;
    } else {
        let roster = session.load_roster(&roster_upload)?;
        ensure_section(roster, &section)?;
        session.select_section(section.clone())?;
    }
    println!("👥 Section {}: {} active students", section, session.students().len());
    warn_invalid_emails(&session.student_info());

    // Assessments
    let mut uploads = Vec::new();
    for path in matches.get_many::<String>("assessments").into_iter().flatten() {
        println!("📄 Processing: {}", path);
        let upload = Upload::from_path(Path::new(path))
            .with_context(|| format!("Failed to read file: {}", path))?;
        uploads.push(upload);
    }
    let load = session.load_assessments(&uploads)?;
    for file_name in &load.skipped {
        println!(
            "   ⚠️  {} is not a Word, Excel or PowerPoint export and will not be graded",
            file_name
        );
    }
    for application in &load.replaced {
        println!("   ⚠️  More than one {} file uploaded, using the last one", application);
    }
    for application in &load.graded {
        if let Some(key) = session.answer_key(*application) {
            println!(
                "   ✅ {} answer key: {} questions (from submission at {})",
                application,
                key.questions_and_answers.len(),
                key.timestamp
            );
        }
    }
    if load.graded.is_empty() {
        println!("❌ No gradable assessment files given");
        return Ok(());
    }

    let filter = session.date_filter();
    if let Some(since) = filter.since {
        println!("📅 Grading submissions since {}", since);
    }
    if !filter.dates.is_empty() {
        let dates: Vec<String> = filter.dates.iter().map(NaiveDate::to_string).collect();
        println!("📅 Grading submissions on {}", dates.join(", "));
    }

    println!("\n🎯 Grading section {}...", section);
    let outcome = session.grade()?;
    print_summary(&outcome);

    let out = matches
        .get_one::<String>("out")
        .map(PathBuf::from)
        .unwrap_or_else(|| Path::new(&output_dir).join(format!("Section{}_reports.zip", section)));
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let archive = outcome.to_zip()?;
    fs::write(&out, archive).with_context(|| format!("Failed to write archive {}", out.display()))?;

    println!("\n✅ Grading complete!");
    println!("📦 Reports archive: {}", out.display());
    Ok(())
}

fn print_summary(outcome: &GradingOutcome) {
    let reconciliation = &outcome.reconciliation;

    println!("\n📊 SUMMARY");
    println!("==========\n");
    println!("📝 Reports generated: {}", outcome.reports.len());
    for report in &outcome.reports {
        let sheets: Vec<&str> = report.file.sheets.iter().map(|s| s.name.as_str()).collect();
        println!("   • {} ({})", report.student.full_name(), sheets.join(", "));
    }

    let skipped = outcome.skipped_students();
    if !skipped.is_empty() {
        println!("\n🚫 No submissions found for:");
        for student in skipped {
            println!("   • {}", student.full_name());
        }
    }

    if !reconciliation.duplicates.is_empty() {
        println!("\n⚠️  Students sharing the same name (only the first receives submissions):");
        for identity in &reconciliation.duplicates {
            println!("   • {}", identity);
        }
    }

    if !reconciliation.unmatched.is_empty() {
        println!(
            "\n⚠️  {} submissions matched no active student (listed in unmatched_rows.csv):",
            reconciliation.unmatched.len()
        );
        for row in &reconciliation.unmatched {
            println!(
                "   • {} {} [{}] {} {}",
                row.first_name.trim(),
                row.last_name.trim(),
                row.application,
                row.timestamp,
                row.score
            );
        }
    }
}
