use amoe_core::config::{AppConfig, BackoffKind};

pub fn run(config: &AppConfig) {
    let mailbox = &config.mailbox;
    let applicant = &config.applicant;

    let backoff = match mailbox.backoff {
        BackoffKind::Fixed => "fixed".to_string(),
        BackoffKind::Exponential => format!("exponential (max {}s)", mailbox.max_backoff_seconds),
    };

    println!("\n✓ Configuration is valid\n");

    println!("Mailbox");
    println!("  Server:            {}:{}", mailbox.imap_host, mailbox.imap_port);
    println!("  Account:           {}", mailbox.username);
    println!("  Password:          {}", redact(&mailbox.password));
    println!("  Folder:            {}", mailbox.folder);
    println!("  Sender filter:     {}", mailbox.sender_filter);
    println!("  Verification host: {}", mailbox.verification_host);
    println!("  Unseen only:       {}", mailbox.unseen_only);
    println!(
        "  Polling:           {} x {}s, {}",
        mailbox.max_attempts, mailbox.poll_interval_seconds, backoff
    );

    println!("Browser");
    println!("  Headless:          {}", config.browser.headless);
    println!(
        "  Window:            {}x{}",
        config.browser.window_width, config.browser.window_height
    );
    println!("  Element timeout:   {}s", config.browser.element_timeout_seconds);

    println!("Applicant");
    println!(
        "  Name:              {} {} {}",
        applicant.first_name, applicant.last_name, applicant.suffix
    );
    println!("  Street:            {}", applicant.street_address);
    if !applicant.apartment.is_empty() {
        println!("  Apartment:         {}", applicant.apartment);
    }
    println!(
        "  City:              {}, {} {}",
        applicant.city, applicant.state, applicant.zip_code
    );
    println!();
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        "(not set)".to_string()
    } else {
        "*".repeat(8)
    }
}
