use console::Style;
use masterframe_core::catalog::Quality;
use masterframe_core::combine::SkipReason;
use masterframe_core::config::SynthesisConfig;
use masterframe_core::synth::{BatchReport, SynthesisReport};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    good: Style,
    warn: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            good: Style::new().green(),
            warn: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_config_summary(config: &SynthesisConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Master Synthesis"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(16)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Darks"),
        s.path.apply_to(config.catalogs.darks.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Flats"),
        s.path.apply_to(config.catalogs.flats.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Masters"),
        s.path.apply_to(config.catalogs.masters.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.save_location.display())
    );
    let workers = config
        .worker_count
        .map_or_else(|| "auto".to_string(), |n| n.to_string());
    println!("  {:<14}{}", s.label.apply_to("Workers"), s.value.apply_to(workers));
    println!();

    println!("  {}", s.header.apply_to("Flats"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Grouping"),
        s.good.apply_to(config.flats.grouping)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Saturation"),
        s.value.apply_to(config.flats.saturation_threshold)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Min median"),
        s.value.apply_to(config.flats.quality_threshold)
    );
    println!();

    println!("  {}", s.header.apply_to("Dark Selection"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Tolerance"),
        s.value.apply_to(format!("{} d", config.dark_selection.tolerance))
    );
    let mode = if config.dark_selection.strict {
        s.good.apply_to("good darks only")
    } else {
        s.warn.apply_to("any dark")
    };
    println!("    {:<12}{}", s.label.apply_to("Mode"), mode);
    if !config.redo_bad {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Redo"),
            s.warn.apply_to("disabled")
        );
    }
    println!();
}

pub fn print_synthesis_report(report: &SynthesisReport) {
    let s = Styles::new();

    if !report.purged.is_empty() {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Purged"),
            s.warn.apply_to(format!("{} identities", report.purged.len()))
        );
    }
    if report.rejected_rows > 0 {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Rejected"),
            s.warn.apply_to(format!("{} raw rows", report.rejected_rows))
        );
    }
    print_batch(&s, "Darks", &report.darks);
    print_batch(&s, "Flats", &report.flats);

    let unresolved: Vec<_> = report.flats.unresolved().collect();
    if !unresolved.is_empty() {
        println!("  {}", s.header.apply_to("Flats without dark"));
        for master in unresolved {
            println!("    {}", s.warn.apply_to(&master.name));
        }
        println!();
    }
}

fn print_batch(s: &Styles, title: &str, batch: &BatchReport) {
    if batch.identities() == 0 {
        println!(
            "  {:<14}{}",
            s.header.apply_to(title),
            s.label.apply_to("nothing new")
        );
        return;
    }

    let produced: Vec<_> = batch.produced().collect();
    let bad = produced.iter().filter(|m| m.note == Quality::Bad).count();
    println!("  {}", s.header.apply_to(title));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Identities"),
        s.value.apply_to(batch.identities())
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Masters"),
        s.good.apply_to(produced.len())
    );
    if bad > 0 {
        println!("    {:<12}{}", s.label.apply_to("Noted bad"), s.warn.apply_to(bad));
    }
    for (name, reason) in batch.skipped() {
        if *reason != SkipReason::NoFrames {
            println!("    {:<12}{} {}", s.label.apply_to("Skipped"), name, s.warn.apply_to(reason));
        }
    }
    println!();
}
