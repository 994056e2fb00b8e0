//! Compile-time–checked column identifiers for all tables.

use sea_query::Iden;

#[derive(Iden)]
pub enum Users {
    Table,
    Id,
    Email,
    Nickname,
    PasswordHash,
    PasswordSalt,
    ApiKeyHash,
    EmailVerified,
    IsAdmin,
    CreatedAt,
}

#[derive(Iden)]
pub enum RefreshTokens {
    Table,
    Id,
    UserId,
    TokenHash,
    ExpiresAt,
    CreatedAt,
}

#[derive(Iden)]
pub enum EmailVerifications {
    Table,
    TokenHash,
    UserId,
    ExpiresAt,
    CreatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum Profiles {
    Table,
    UserId,
    DisplayName,
    Bio,
    Locale,
    AvatarUrl,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum BusinessProfiles {
    Table,
    UserId,
    CompanyName,
    VatId,
    BillingEmail,
    AddressLine1,
    AddressLine2,
    City,
    PostalCode,
    Country,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Teams {
    Table,
    Id,
    Name,
    Description,
    CreatedBy,
    CreatedAt,
}

#[derive(Iden)]
pub enum TeamMembers {
    Table,
    TeamId,
    UserId,
    Role,
    JoinedAt,
}

#[derive(Iden)]
pub enum TeamInvitations {
    Table,
    Id,
    TeamId,
    Email,
    InvitedBy,
    Role,
    Status,
    CreatedAt,
    ExpiresAt,
}

#[derive(Iden)]
pub enum Grants {
    Table,
    UserId,
    ResourceId,
    Role,
    CreatedAt,
}

#[derive(Iden)]
pub enum ResourceLinks {
    Table,
    ChildId,
    ParentId,
    CreatedAt,
}

#[derive(Iden)]
pub enum SsoProviders {
    Table,
    Id,
    OrgId,
    IdpType,
    Enabled,
    ConfigJson,
    UpdatedAt,
}

#[derive(Iden)]
pub enum Webhooks {
    Table,
    Id,
    UserId,
    Url,
    Secret,
    Events,
    Enabled,
    CreatedAt,
}

#[derive(Iden)]
pub enum WebhookDeliveries {
    Table,
    Id,
    WebhookId,
    EventType,
    Payload,
    Status,
    Failure,
    ResponseStatus,
    Attempts,
    CreatedAt,
}

#[derive(Iden)]
pub enum DeletionRequests {
    Table,
    Id,
    UserId,
    Status,
    RequestedAt,
    GraceUntil,
}

#[derive(Iden)]
pub enum DataExports {
    Table,
    Id,
    UserId,
    Status,
    Data,
    CreatedAt,
}

#[derive(Iden)]
pub enum Notifications {
    Table,
    Id,
    UserId,
    Kind,
    Title,
    Body,
    Read,
    CreatedAt,
}

#[derive(Iden)]
pub enum AuditLog {
    Table,
    Id,
    ActorId,
    Action,
    TargetId,
    Detail,
    CreatedAt,
}
