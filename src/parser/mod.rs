pub mod datetime;
pub mod labels;
pub mod records;
pub mod segments;
pub mod text;

use tracing::debug;

use labels::{extract, extract_any};
use records::{Injury, MotorCarrier, ParsedDocument, Report, Vehicle};
use segments::{segment, RecordKind};

const PREVIEW_LINES: usize = 8;

/// Pipeline: markup → plain text → header labels → vehicle, injury and
/// motor-carrier blocks → one document.
///
/// Total over any input. `fallback_id` becomes the case number only when the
/// page itself has none.
pub fn parse(markup: &str, fallback_id: Option<&str>) -> ParsedDocument {
    let text = text::clean_text(markup);

    let mut report = extract_report(&text);
    if report.case_number.is_none() {
        report.case_number = fallback_id.map(str::to_string);
    }

    let vehicles: Vec<Vehicle> = segment(&text, RecordKind::Vehicle)
        .into_iter()
        .filter_map(|seg| Some(extract_vehicle(seg.index?, seg.text)))
        .collect();

    let injuries: Vec<Injury> = segment(&text, RecordKind::Injury)
        .into_iter()
        .filter_map(|seg| Some(extract_injury(seg.index?, seg.text)))
        .collect();

    let mut motor_carriers: Vec<MotorCarrier> = Vec::new();
    for seg in segment(&text, RecordKind::MotorCarrier) {
        let carrier = extract_carrier(seg.text);
        if !carrier.is_empty() && !motor_carriers.contains(&carrier) {
            motor_carriers.push(carrier);
        }
    }

    let preview = text.lines().take(PREVIEW_LINES).map(str::to_string).collect();

    debug!(
        case_number = report.case_number.as_deref().unwrap_or("-"),
        vehicles = vehicles.len(),
        injuries = injuries.len(),
        motor_carriers = motor_carriers.len(),
        "parsed report"
    );

    ParsedDocument {
        report,
        vehicles,
        injuries,
        motor_carriers,
        preview,
    }
}

fn extract_report(text: &str) -> Report {
    Report {
        case_number: extract(text, "Case Number"),
        report_type: extract(text, "Type"),
        county: extract(text, "County"),
        crash_date: extract(text, "Crash Date").map(|d| datetime::normalize_date(&d)),
        crash_time: extract(text, "Time").map(|t| datetime::normalize_time(&t)),
        location: extract(text, "Location"),
        officer_name: extract(text, "Officer Name"),
        post: extract(text, "Post"),
        assisted_by: extract(text, "Assisted By"),
        summary: extract(text, "Summary"),
    }
}

fn extract_vehicle(vehicle_number: u32, block: &str) -> Vehicle {
    Vehicle {
        vehicle_number,
        year: extract(block, "Year"),
        make: extract(block, "Make"),
        kind: extract(block, "Type"),
        towed_by: extract(block, "Towed By"),
        driver_name: extract(block, "Driver Name"),
        age: extract(block, "Age"),
        city_state: extract_any(block, &["City & State of Residence", "City & State"]),
    }
}

fn extract_injury(injury_index: u32, block: &str) -> Injury {
    // The numbered label is checked before the plain one.
    let numbered_type = format!("Injury {} Type", injury_index);
    Injury {
        injury_index,
        kind: extract_any(block, &[numbered_type.as_str(), "Type"]),
        name: extract(block, "Name"),
        age: extract(block, "Age"),
        city_state: extract_any(block, &["City & State of Residence", "City State"]),
        seatbelt_use: extract(block, "Seatbelt Use"),
        life_saved_by_seatbelt: extract(block, "Life saved by Seatbelt"),
        transported_to: extract(block, "Transported To"),
        transported_by: extract(block, "Transported By"),
    }
}

fn extract_carrier(block: &str) -> MotorCarrier {
    MotorCarrier {
        carrier_name: extract(block, "Name of Carrier"),
        usdot_or_mcc: extract(block, "DOT or MCC #"),
        city_state: extract(block, "City & State of Carrier"),
        hazmat_involved: extract(block, "Hazmat Involved?"),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const FLAT: &str = "Case Number: 24-001  County: Polk  Crash Date: 01012024  Time: 1430  Vehicle 1  Year: 2019  Make: Honda  Injury 1  Type: Injured  Name: Jane Doe  Summary: rear-end collision";

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn flat_single_line_report() {
        let doc = parse(FLAT, None);
        let r = &doc.report;
        assert_eq!(r.case_number.as_deref(), Some("24-001"));
        assert_eq!(r.county.as_deref(), Some("Polk"));
        assert_eq!(r.crash_date.as_deref(), Some("2024-01-01"));
        assert_eq!(r.crash_time.as_deref(), Some("14:30"));
        assert_eq!(r.summary.as_deref(), Some("rear-end collision"));

        assert_eq!(doc.vehicles.len(), 1);
        let v = &doc.vehicles[0];
        assert_eq!(v.vehicle_number, 1);
        assert_eq!(v.year.as_deref(), Some("2019"));
        assert_eq!(v.make.as_deref(), Some("Honda"));
        assert_eq!(v.driver_name, None);

        assert_eq!(doc.injuries.len(), 1);
        let i = &doc.injuries[0];
        assert_eq!(i.injury_index, 1);
        assert_eq!(i.kind.as_deref(), Some("Injured"));
        assert_eq!(i.name.as_deref(), Some("Jane Doe"));

        assert!(doc.motor_carriers.is_empty());
    }

    #[test]
    fn parsing_is_repeatable() {
        assert_eq!(parse(FLAT, None), parse(FLAT, None));
        let html = fixture("semi_truck");
        assert_eq!(parse(&html, Some("x")), parse(&html, Some("x")));
    }

    #[test]
    fn unrelated_text() {
        let doc = parse("<html><body><p>Nothing to see here.</p></body></html>", None);
        assert_eq!(doc.report, Report::default());
        assert!(doc.vehicles.is_empty());
        assert!(doc.injuries.is_empty());
        assert!(doc.motor_carriers.is_empty());
        assert_eq!(doc.preview, vec!["Nothing to see here."]);
    }

    #[test]
    fn empty_input() {
        let doc = parse("", None);
        assert_eq!(doc, ParsedDocument::default());
    }

    #[test]
    fn fallback_id_only_when_case_number_missing() {
        let doc = parse("County: Polk", Some("CASE-77"));
        assert_eq!(doc.report.case_number.as_deref(), Some("CASE-77"));

        let doc = parse(FLAT, Some("CASE-77"));
        assert_eq!(doc.report.case_number.as_deref(), Some("24-001"));
    }

    #[test]
    fn vehicle_numbers_follow_markers() {
        let text = "Vehicle 1\nMake: Ford\nVehicle 3\nMake: Kia\nVehicle 2\nMake: Audi";
        let doc = parse(text, None);
        let numbers: Vec<u32> = doc.vehicles.iter().map(|v| v.vehicle_number).collect();
        assert_eq!(numbers, vec![1, 3, 2]);
        assert_eq!(doc.vehicles[1].make.as_deref(), Some("Kia"));
    }

    #[test]
    fn numbered_injury_type_preferred() {
        let text = "Injury 2\nType: Injured\nInjury 2 Type: Fatality\nName: John Roe";
        let doc = parse(text, None);
        assert_eq!(doc.injuries.len(), 1);
        assert_eq!(doc.injuries[0].injury_index, 2);
        assert_eq!(doc.injuries[0].kind.as_deref(), Some("Fatality"));
        assert_eq!(doc.injuries[0].name.as_deref(), Some("John Roe"));
    }

    #[test]
    fn injury_heading_then_numbered_type_is_one_injury() {
        let doc = parse("Injury 1\nInjury 1 Type: Injured\nName: Jane Doe", None);
        assert_eq!(doc.injuries.len(), 1);
        assert_eq!(doc.injuries[0].kind.as_deref(), Some("Injured"));
        assert_eq!(doc.injuries[0].name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn summary_narrative_adds_no_vehicles() {
        let text = "Vehicle 1\nYear: 2019\nMake: Ford\nCase Number: 9\nSummary:\nVehicle 1 driver stated: the light was green";
        let doc = parse(text, None);
        assert_eq!(doc.vehicles.len(), 1);
        assert_eq!(doc.vehicles[0].year.as_deref(), Some("2019"));
        assert_eq!(doc.vehicles[0].make.as_deref(), Some("Ford"));
        assert_eq!(
            doc.report.summary.as_deref(),
            Some("Vehicle 1 driver stated: the light was green")
        );
    }

    #[test]
    fn duplicate_carrier_blocks_collapse() {
        let block = "Motor Carrier Info\nName of Carrier: ACME Freight\nDOT or MCC #: 123456\n";
        let text = format!("Case Number: 9\n{block}{block}Summary: jackknife");
        let doc = parse(&text, None);
        assert_eq!(doc.motor_carriers.len(), 1);
        assert_eq!(doc.motor_carriers[0].carrier_name.as_deref(), Some("ACME Freight"));
        assert_eq!(doc.motor_carriers[0].usdot_or_mcc.as_deref(), Some("123456"));
    }

    #[test]
    fn empty_carrier_block_not_emitted() {
        let doc = parse("Motor Carrier Info\nSummary: none", None);
        assert!(doc.motor_carriers.is_empty());
    }

    #[test]
    fn unparsed_date_and_time_pass_through() {
        let doc = parse("Crash Date: unknown  Time: dusk", None);
        assert_eq!(doc.report.crash_date.as_deref(), Some("unknown"));
        assert_eq!(doc.report.crash_time.as_deref(), Some("dusk"));

        let doc = parse("Case Number: 1  Time: ９３０", None);
        assert_eq!(doc.report.crash_time.as_deref(), Some("９３０"));
    }

    #[test]
    fn semi_truck_fixture() {
        let doc = parse(&fixture("semi_truck"), Some("ignored"));
        let r = &doc.report;
        assert_eq!(r.case_number.as_deref(), Some("2024-0317"));
        assert_eq!(r.report_type.as_deref(), Some("Injury"));
        assert_eq!(r.county.as_deref(), Some("Story"));
        assert_eq!(r.crash_date.as_deref(), Some("2024-03-17"));
        assert_eq!(r.crash_time.as_deref(), Some("07:45"));
        assert_eq!(r.location.as_deref(), Some("I-35 northbound at mile marker 113"));
        assert_eq!(r.officer_name.as_deref(), Some("Trooper A. Lindqvist"));
        assert_eq!(r.post.as_deref(), Some("16"));
        assert_eq!(r.assisted_by.as_deref(), Some("Story County Sheriff's Office"));
        assert!(r.summary.as_deref().unwrap().starts_with("Vehicle 1 was traveling"));

        let numbers: Vec<u32> = doc.vehicles.iter().map(|v| v.vehicle_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        let semi = &doc.vehicles[0];
        assert_eq!(semi.year.as_deref(), Some("2021"));
        assert_eq!(semi.make.as_deref(), Some("Freightliner"));
        assert_eq!(semi.kind.as_deref(), Some("Truck Tractor"));
        assert_eq!(semi.towed_by.as_deref(), Some("Ames Towing"));
        assert_eq!(semi.driver_name.as_deref(), Some("Marcus Webb"));
        assert_eq!(semi.age.as_deref(), Some("47"));
        assert_eq!(semi.city_state.as_deref(), Some("Joliet, IL"));

        assert_eq!(doc.injuries.len(), 1);
        let inj = &doc.injuries[0];
        assert_eq!(inj.injury_index, 1);
        assert_eq!(inj.kind.as_deref(), Some("Injured"));
        assert_eq!(inj.name.as_deref(), Some("Dana Kowalski"));
        assert_eq!(inj.age.as_deref(), Some("29"));
        assert_eq!(inj.city_state.as_deref(), Some("Ankeny, IA"));
        assert_eq!(inj.seatbelt_use.as_deref(), Some("Yes"));
        assert_eq!(inj.life_saved_by_seatbelt.as_deref(), Some("Yes"));
        assert_eq!(inj.transported_to.as_deref(), Some("Mary Greeley Medical Center"));
        assert_eq!(inj.transported_by.as_deref(), Some("Ames Fire Department"));

        assert_eq!(doc.motor_carriers.len(), 1);
        let mc = &doc.motor_carriers[0];
        assert_eq!(mc.carrier_name.as_deref(), Some("Prairie Haul LLC"));
        assert_eq!(mc.usdot_or_mcc.as_deref(), Some("2871034"));
        assert_eq!(mc.city_state.as_deref(), Some("Joliet, IL"));
        assert_eq!(mc.hazmat_involved.as_deref(), Some("No"));

        assert_eq!(doc.preview.len(), 8);
        assert_eq!(doc.preview[0], "Iowa DPS Crash Report");
    }
}
