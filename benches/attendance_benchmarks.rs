use attendance_core::{
    distance_meters, AttendanceStatus, Coordinates, ProximityChecker, ScannedIdentity,
    StatusClassifier, TokenVerifier,
};
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::SecretString;
use serde_json::json;

fn bench_haversine(c: &mut Criterion) {
    c.bench_function("haversine_campus_distance", |b| {
        b.iter(|| {
            distance_meters(
                black_box(-1.2921),
                black_box(36.8219),
                black_box(-1.2923),
                black_box(36.8221),
            )
        })
    });

    let anchor = Coordinates::new(-1.2921, 36.8219).unwrap();
    let subject = Coordinates::new(-1.2925, 36.8219).unwrap();
    let checker = ProximityChecker::new(30.0);
    c.bench_function("proximity_check", |b| {
        b.iter(|| checker.check(black_box(&subject), black_box(&anchor)))
    });
}

fn bench_classify(c: &mut Criterion) {
    let classifier = StatusClassifier::new(0.25);
    let start = Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap();
    let end = start + Duration::hours(2);
    let recorded_at = start + Duration::minutes(20);

    let status = classifier.classify(true, recorded_at, start, end);
    assert_eq!(status, AttendanceStatus::Present);

    c.bench_function("classify_status", |b| {
        b.iter(|| {
            classifier.classify(
                black_box(true),
                black_box(recorded_at),
                black_box(start),
                black_box(end),
            )
        })
    });
}

fn bench_verify_token(c: &mut Criterion) {
    let secret = "bench-signing-secret";
    let now = Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap();
    let token = encode(
        &Header::new(Algorithm::HS256),
        &json!({
            "sub": "1024",
            "session_id": "lec-77",
            "exp": (now + Duration::hours(1)).timestamp(),
        }),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap();
    let verifier = TokenVerifier::new(&SecretString::new(secret.to_string()));

    match verifier.verify(&token, now) {
        Ok(_) => {
            c.bench_function("verify_token", |b| {
                b.iter(|| verifier.verify(black_box(&token), now).unwrap())
            });
        }
        Err(e) => {
            panic!("Failed to verify benchmark token: {:?}", e);
        }
    }

    c.bench_function("parse_scanned_identity", |b| {
        b.iter(|| ScannedIdentity::parse(black_box("BCS/234344")).unwrap())
    });
}

criterion_group!(benches, bench_haversine, bench_classify, bench_verify_token);
criterion_main!(benches);
