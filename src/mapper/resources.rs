//! Static resource catalog, in sync priority order per provider.

use super::{
    DefaultValue, FieldMapping, KeyCase, MappingError, ProviderKind, ResourceSpec, Tombstone,
};

const EMPTY: DefaultValue = DefaultValue::Text("");
const ZERO: DefaultValue = DefaultValue::Integer(0);

// Salesforce ------------------------------------------------------------------

const SF_ACCOUNT_FIELDS: &[FieldMapping] = &[
    FieldMapping::text("master_record_id"),
    FieldMapping::text_max("name", 255),
    FieldMapping::text("type"),
    FieldMapping::text("parent_id"),
    FieldMapping::text("billing_street"),
    FieldMapping::text("billing_city"),
    FieldMapping::text("billing_state"),
    FieldMapping::text("billing_postal_code"),
    FieldMapping::text("billing_country"),
    FieldMapping::text("phone"),
    FieldMapping::text("website"),
    FieldMapping::text("industry"),
    FieldMapping::text("annual_revenue"),
    FieldMapping::text("number_of_employees"),
    FieldMapping::text_max("description", 32_000),
    FieldMapping::text("owner_id"),
    FieldMapping::text("account_source"),
    FieldMapping::text("created_date"),
    FieldMapping::text("created_by_id"),
    FieldMapping::text("last_modified_date"),
    FieldMapping::text("last_modified_by_id"),
    FieldMapping::text("system_modstamp"),
    FieldMapping::text("last_activity_date"),
];

const SF_CONTACT_FIELDS: &[FieldMapping] = &[
    FieldMapping::text("master_record_id"),
    FieldMapping::text("account_id"),
    FieldMapping::text_max("name", 255),
    FieldMapping::text("first_name"),
    FieldMapping::text("last_name"),
    FieldMapping::text("salutation"),
    FieldMapping::text("mailing_street"),
    FieldMapping::text("mailing_city"),
    FieldMapping::text("mailing_state"),
    FieldMapping::text("mailing_postal_code"),
    FieldMapping::text("mailing_country"),
    FieldMapping::text("phone"),
    FieldMapping::text("mobile_phone"),
    FieldMapping::text("email"),
    FieldMapping::text("title"),
    FieldMapping::text("department"),
    FieldMapping::text("lead_source"),
    FieldMapping::text_max("description", 32_000),
    FieldMapping::text("owner_id"),
    FieldMapping::text("has_opted_out_of_email"),
    FieldMapping::text("created_date"),
    FieldMapping::text("created_by_id"),
    FieldMapping::text("last_modified_date"),
    FieldMapping::text("last_modified_by_id"),
    FieldMapping::text("system_modstamp"),
    FieldMapping::text("last_activity_date"),
];

const SF_OPPORTUNITY_FIELDS: &[FieldMapping] = &[
    FieldMapping::text("account_id"),
    FieldMapping::text("record_type_id"),
    FieldMapping::text_max("name", 255),
    FieldMapping::text_max("description", 32_000),
    FieldMapping::text("stage_name"),
    FieldMapping::text("amount"),
    FieldMapping::text("probability"),
    FieldMapping::text("close_date"),
    FieldMapping::text("type"),
    FieldMapping::text("next_step"),
    FieldMapping::text("lead_source"),
    FieldMapping::text("is_closed"),
    FieldMapping::text("is_won"),
    FieldMapping::text("forecast_category"),
    FieldMapping::text("campaign_id"),
    FieldMapping::text("owner_id"),
    FieldMapping::text("fiscal_quarter"),
    FieldMapping::text("fiscal_year"),
    FieldMapping::text("created_date"),
    FieldMapping::text("created_by_id"),
    FieldMapping::text("last_modified_date"),
    FieldMapping::text("last_modified_by_id"),
    FieldMapping::text("system_modstamp"),
];

const SF_OPPORTUNITY_HISTORY_FIELDS: &[FieldMapping] = &[
    FieldMapping::text("opportunity_id"),
    FieldMapping::text("created_by_id"),
    FieldMapping::text("created_date"),
    FieldMapping::text("stage_name"),
    FieldMapping::text("amount"),
    FieldMapping::text("expected_revenue"),
    FieldMapping::text("close_date"),
    FieldMapping::text("probability"),
    FieldMapping::text("forecast_category"),
    FieldMapping::text("system_modstamp"),
];

const fn salesforce(
    name: &'static str,
    table: &'static str,
    fields: &'static [FieldMapping],
) -> ResourceSpec {
    ResourceSpec {
        provider: ProviderKind::Salesforce,
        name,
        table,
        remote_name: name,
        cursor_field: Some("Id"),
        key_case: KeyCase::Pascal,
        native_id_source: "Id",
        tombstone: Tombstone::Flag("IsDeleted"),
        fields,
    }
}

pub static SALESFORCE_RESOURCES: &[ResourceSpec] = &[
    salesforce("Account", "salesforce_accounts", SF_ACCOUNT_FIELDS),
    salesforce("Contact", "salesforce_contacts", SF_CONTACT_FIELDS),
    salesforce("Opportunity", "salesforce_opportunities", SF_OPPORTUNITY_FIELDS),
    salesforce(
        "OpportunityHistory",
        "salesforce_opportunity_histories",
        SF_OPPORTUNITY_HISTORY_FIELDS,
    ),
];

// Outreach --------------------------------------------------------------------

const OUTREACH_ACCOUNT_FIELDS: &[FieldMapping] = &[
    FieldMapping::text("name").or(EMPTY),
    FieldMapping::text("natural_name").or(EMPTY),
    FieldMapping::text("company_type").or(EMPTY),
    FieldMapping::text("domain").or(EMPTY),
    FieldMapping::text("website_url").or(EMPTY),
    FieldMapping::text("created_at"),
    FieldMapping::text("updated_at"),
];

const OUTREACH_PROSPECT_FIELDS: &[FieldMapping] = &[
    FieldMapping::text("account_id"),
    FieldMapping::text("owner_id"),
    FieldMapping::text("engaged_score"),
    FieldMapping::text("first_name").or(EMPTY),
    FieldMapping::text("last_name").or(EMPTY),
    FieldMapping::text("middle_name").or(EMPTY),
    FieldMapping::text("occupation").or(EMPTY),
    FieldMapping::text("title").or(EMPTY),
    FieldMapping::integer("open_count").or(ZERO),
    FieldMapping::integer("reply_count").or(ZERO),
    FieldMapping::integer("click_count").or(ZERO),
    FieldMapping::text("engaged_at"),
    FieldMapping::text("opted_out_at"),
    FieldMapping::text("created_at"),
    FieldMapping::text("updated_at"),
];

const OUTREACH_USER_FIELDS: &[FieldMapping] = &[
    FieldMapping::text("email_address").from("email").or(EMPTY),
    FieldMapping::text("first_name").or(EMPTY),
    FieldMapping::text("last_name").or(EMPTY),
    FieldMapping::text("username").or(EMPTY),
];

const OUTREACH_MAILING_FIELDS: &[FieldMapping] = &[
    FieldMapping::text("prospect_id"),
    FieldMapping::text("mailing_type").or(EMPTY),
    FieldMapping::text("mailbox_address").or(EMPTY),
    FieldMapping::text_max("subject", 1_000),
    FieldMapping::text_max("body_text", 100_000),
    FieldMapping::integer("open_count"),
    FieldMapping::integer("click_count"),
    FieldMapping::text("opened_at"),
    FieldMapping::text("replied_at"),
    FieldMapping::text("bounced_at"),
    FieldMapping::text("marked_as_spam_at"),
    FieldMapping::text("scheduled_at"),
    FieldMapping::text("created_at"),
    FieldMapping::text("updated_at"),
];

const OUTREACH_CALL_FIELDS: &[FieldMapping] = &[
    FieldMapping::text("prospect_id"),
    FieldMapping::text("user_id"),
    FieldMapping::text("outcome"),
    FieldMapping::text("answered_at"),
    FieldMapping::text("completed_at"),
    FieldMapping::text("direction").or(EMPTY),
    FieldMapping::text("state").or(EMPTY),
    FieldMapping::text("record_url"),
    FieldMapping::text("created_at"),
    FieldMapping::text("updated_at"),
];

const fn outreach(
    name: &'static str,
    table: &'static str,
    fields: &'static [FieldMapping],
) -> ResourceSpec {
    ResourceSpec {
        provider: ProviderKind::Outreach,
        name,
        table,
        remote_name: name,
        cursor_field: Some("id"),
        key_case: KeyCase::Camel,
        native_id_source: "id",
        tombstone: Tombstone::None,
        fields,
    }
}

pub static OUTREACH_RESOURCES: &[ResourceSpec] = &[
    outreach("accounts", "outreach_accounts", OUTREACH_ACCOUNT_FIELDS),
    outreach("prospects", "outreach_prospects", OUTREACH_PROSPECT_FIELDS),
    outreach("users", "outreach_users", OUTREACH_USER_FIELDS),
    outreach("mailings", "outreach_mailings", OUTREACH_MAILING_FIELDS),
    outreach("calls", "outreach_calls", OUTREACH_CALL_FIELDS),
];

// Google Calendar -------------------------------------------------------------

const CALENDAR_FIELDS: &[FieldMapping] = &[
    FieldMapping::text_max("summary", 1_024),
    FieldMapping::text_max("summary_override", 1_024),
    FieldMapping::text("description"),
    FieldMapping::text("location"),
    FieldMapping::text("time_zone"),
    FieldMapping::text("access_role"),
    FieldMapping::boolean("is_primary").from("primary"),
    FieldMapping::boolean("hidden"),
    FieldMapping::text("sync_user"),
    FieldMapping::text("sync_connection_id"),
];

const EVENT_FIELDS: &[FieldMapping] = &[
    FieldMapping::text("calendar_id"),
    FieldMapping::text_max("summary", 1_024),
    FieldMapping::text("description"),
    FieldMapping::text("status"),
    FieldMapping::text("html_link"),
    FieldMapping::text("recurring_event_id"),
    FieldMapping::json("start_time").from("start"),
    FieldMapping::json("end_time").from("end"),
    FieldMapping::json("attendees"),
    FieldMapping::json("creator"),
    FieldMapping::json("organizer"),
    FieldMapping::text("created"),
    FieldMapping::text("updated"),
];

pub static GOOGLE_CALENDAR_LIST: ResourceSpec = ResourceSpec {
    provider: ProviderKind::GoogleCalendar,
    name: "calendar_list",
    table: "google_calendars",
    remote_name: "calendarList",
    cursor_field: None,
    key_case: KeyCase::Camel,
    native_id_source: "id",
    tombstone: Tombstone::Flag("deleted"),
    fields: CALENDAR_FIELDS,
};

/// Events of one calendar; the checkpoint name is `events:<calendar id>`.
pub static GOOGLE_CALENDAR_EVENTS: ResourceSpec = ResourceSpec {
    provider: ProviderKind::GoogleCalendar,
    name: "events",
    table: "google_calendar_events",
    remote_name: "events",
    cursor_field: None,
    key_case: KeyCase::Camel,
    native_id_source: "id",
    tombstone: Tombstone::Equals("status", "cancelled"),
    fields: EVENT_FIELDS,
};

pub static GOOGLE_CALENDAR_RESOURCES: &[&ResourceSpec] =
    &[&GOOGLE_CALENDAR_LIST, &GOOGLE_CALENDAR_EVENTS];

/// Every resource of `provider`, in sync priority order.
pub fn resources_for(provider: ProviderKind) -> Vec<&'static ResourceSpec> {
    match provider {
        ProviderKind::Salesforce => SALESFORCE_RESOURCES.iter().collect(),
        ProviderKind::Outreach => OUTREACH_RESOURCES.iter().collect(),
        ProviderKind::GoogleCalendar => GOOGLE_CALENDAR_RESOURCES.to_vec(),
    }
}

pub fn find_resource(
    provider: ProviderKind,
    name: &str,
) -> Result<&'static ResourceSpec, MappingError> {
    resources_for(provider)
        .into_iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| MappingError::UnknownResource(format!("{}:{name}", provider.slug())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{ColumnValue, RecordOp, map_row};
    use serde_json::json;

    #[test]
    fn catalog_order_is_fixed() {
        let names: Vec<_> = resources_for(ProviderKind::Salesforce)
            .iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["Account", "Contact", "Opportunity", "OpportunityHistory"]);

        let names: Vec<_> = resources_for(ProviderKind::Outreach)
            .iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["accounts", "prospects", "users", "mailings", "calls"]);

        let names: Vec<_> = resources_for(ProviderKind::GoogleCalendar)
            .iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["calendar_list", "events"]);
    }

    #[test]
    fn salesforce_csv_row_maps_pascal_case_columns() {
        let spec = find_resource(ProviderKind::Salesforce, "Account").unwrap();
        let row = json!({
            "Id": "001xx0000001",
            "IsDeleted": "false",
            "Name": "Acme",
            "BillingCity": "Lisbon",
            "NumberOfEmployees": "",
            "Custom__c": "x",
        });
        let RecordOp::Upsert(record) = map_row(spec, row.as_object().unwrap()).unwrap() else {
            panic!("expected upsert");
        };
        assert_eq!(record.native_id, "001xx0000001");
        assert_eq!(record.value("name"), Some(&ColumnValue::Text(Some("Acme".into()))));
        assert_eq!(
            record.value("billing_city"),
            Some(&ColumnValue::Text(Some("Lisbon".into())))
        );
        assert_eq!(record.value("number_of_employees"), Some(&ColumnValue::Text(None)));
        assert_eq!(record.extra["Custom__c"], json!("x"));
        assert_eq!(record.values.len(), spec.fields.len());
    }

    #[test]
    fn outreach_user_reads_email_override() {
        let spec = find_resource(ProviderKind::Outreach, "users").unwrap();
        let row = json!({"id": 3, "email": "a@b.co", "firstName": null});
        let RecordOp::Upsert(record) = map_row(spec, row.as_object().unwrap()).unwrap() else {
            panic!("expected upsert");
        };
        assert_eq!(
            record.value("email_address"),
            Some(&ColumnValue::Text(Some("a@b.co".into())))
        );
        assert_eq!(
            record.value("first_name"),
            Some(&ColumnValue::Text(Some(String::new())))
        );
    }

    #[test]
    fn outreach_mailing_keeps_spam_marker_out_of_extra() {
        let spec = find_resource(ProviderKind::Outreach, "mailings").unwrap();
        let row = json!({"id": 9, "markedAsSpamAt": "2026-02-01T08:00:00Z", "bouncedAt": null});
        let RecordOp::Upsert(record) = map_row(spec, row.as_object().unwrap()).unwrap() else {
            panic!("expected upsert");
        };
        assert_eq!(
            record.value("marked_as_spam_at"),
            Some(&ColumnValue::Text(Some("2026-02-01T08:00:00Z".into())))
        );
        assert!(record.extra.get("markedAsSpamAt").is_none());
    }

    #[test]
    fn unknown_resource_is_reported() {
        assert!(find_resource(ProviderKind::Outreach, "sequences").is_err());
    }
}
