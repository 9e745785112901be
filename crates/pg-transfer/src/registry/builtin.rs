//! Built-in descriptors for the application's Prisma-managed schema.
//!
//! Physical names follow Prisma's default mapping (model name, no `@@map`).
//! Adding an entity type means adding one line here with a rank above all
//! of its parents.

use super::TableDescriptor;

pub(super) fn descriptors() -> Vec<TableDescriptor> {
    vec![
        TableDescriptor::new("users", 0, "User"),
        TableDescriptor::new("accounts", 1, "Account").with_parents(["users"]),
        TableDescriptor::new("sessions", 1, "Session").with_parents(["users"]),
        TableDescriptor::new("verification_tokens", 1, "VerificationToken")
            .with_primary_key(["identifier", "token"]),
        TableDescriptor::new("articles", 1, "Article").with_parents(["users"]),
        TableDescriptor::new("resources", 1, "Resource"),
        TableDescriptor::new("cryptocurrencies", 1, "Cryptocurrency"),
        TableDescriptor::new("copilot_activities", 1, "CopilotActivity"),
        TableDescriptor::new("automation_tasks", 1, "AutomationTask"),
        TableDescriptor::new("copilot_reports", 1, "CopilotReport"),
        TableDescriptor::new("community_stories", 1, "CommunityStory"),
        TableDescriptor::new("social_projects", 1, "SocialProject"),
        TableDescriptor::new("project_maps", 2, "ProjectMap").with_parents(["social_projects"]),
        TableDescriptor::new("user_progress", 2, "UserProgress").with_parents(["users"]),
    ]
}
