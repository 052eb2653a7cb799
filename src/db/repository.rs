use std::collections::HashMap;

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Transaction};

use crate::db::CourseQuery;
use crate::models::{
    Course, CourseKey, CourseListing, Meeting, NewSemester, Professor, Section, SectionGroup,
    Semester,
};
use crate::text::like_pattern;

/// Upper bound on ids bound into a single `IN (...)` list.
const IN_CHUNK: usize = 500;

#[derive(FromRow)]
struct GroupRow {
    id: i64,
    course_id: i64,
    units_min: f64,
    units_max: f64,
    components_required: String,
}

#[derive(FromRow)]
struct SectionRow {
    id: i64,
    group_id: i64,
    class_nbr: i64,
    section: String,
    component: String,
    campus: Option<String>,
    location: Option<String>,
}

#[derive(FromRow)]
struct MeetingRow {
    id: i64,
    section_id: i64,
    pattern: Option<String>,
    time_start: Option<String>,
    time_end: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    facility: Option<String>,
}

#[derive(FromRow)]
struct MeetingProfessorRow {
    meeting_id: i64,
    netid: String,
    first_name: String,
    last_name: String,
}

pub async fn find_courses(
    db: &SqlitePool,
    query: &CourseQuery,
) -> Result<Vec<Course>, sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT id, term, subject, crse_id, catalog_nbr, title_long, description FROM courses WHERE term = ",
    );
    qb.push_bind(query.term.clone());

    for filter in &query.filters {
        qb.push(format_args!(" AND {} LIKE ", filter.column()));
        qb.push_bind(like_pattern(filter.needle()));
        qb.push(" ESCAPE '\\'");
    }

    if !query.exclude_ids.is_empty() {
        qb.push(" AND id NOT IN (");
        let mut separated = qb.separated(", ");
        for id in &query.exclude_ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
    }

    qb.push(" ORDER BY subject, catalog_nbr, id LIMIT ");
    qb.push_bind(i64::try_from(query.limit).unwrap_or(i64::MAX));

    let mut courses = qb.build_query_as::<Course>().fetch_all(db).await?;

    if query.with_related {
        attach_groups(db, &mut courses).await?;
    }

    Ok(courses)
}

pub async fn find_course(
    db: &SqlitePool,
    term: &str,
    key: &CourseKey,
) -> Result<Option<Course>, sqlx::Error> {
    let course = sqlx::query_as::<_, Course>(
        r#"
        SELECT id, term, subject, crse_id, catalog_nbr, title_long, description
        FROM courses
        WHERE term = ?1 AND subject = ?2 AND crse_id = ?3
        "#,
    )
    .bind(term)
    .bind(&key.subject)
    .bind(key.crse_id)
    .fetch_optional(db)
    .await?;

    match course {
        Some(course) => {
            let mut courses = vec![course];
            attach_groups(db, &mut courses).await?;
            Ok(courses.pop())
        }
        None => Ok(None),
    }
}

pub async fn fetch_term_courses(db: &SqlitePool, term: &str) -> Result<Vec<Course>, sqlx::Error> {
    let mut courses = sqlx::query_as::<_, Course>(
        r#"
        SELECT id, term, subject, crse_id, catalog_nbr, title_long, description
        FROM courses
        WHERE term = ?1
        ORDER BY id
        "#,
    )
    .bind(term)
    .fetch_all(db)
    .await?;

    attach_groups(db, &mut courses).await?;
    Ok(courses)
}

pub async fn insert_course(
    db: &SqlitePool,
    term: &str,
    listing: &CourseListing,
) -> Result<i64, sqlx::Error> {
    let mut tx = db.begin().await?;

    let id = sqlx::query(
        r#"
        INSERT INTO courses
            (term, subject, crse_id, catalog_nbr, title_long, description)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(term)
    .bind(&listing.subject)
    .bind(listing.crse_id)
    .bind(&listing.catalog_nbr)
    .bind(&listing.title_long)
    .bind(&listing.description)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    insert_groups(&mut tx, id, &listing.groups).await?;
    tx.commit().await?;

    Ok(id)
}

pub async fn update_course(
    db: &SqlitePool,
    id: i64,
    listing: &CourseListing,
) -> Result<(), sqlx::Error> {
    let mut tx = db.begin().await?;

    let affected = sqlx::query(
        r#"
        UPDATE courses
        SET catalog_nbr = ?1,
            title_long = ?2,
            description = ?3
        WHERE id = ?4
        "#,
    )
    .bind(&listing.catalog_nbr)
    .bind(&listing.title_long)
    .bind(&listing.description)
    .bind(id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if affected == 0 {
        return Err(sqlx::Error::RowNotFound);
    }

    // Children are replaced wholesale; sections and meetings cascade.
    sqlx::query("DELETE FROM section_groups WHERE course_id = ?1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    insert_groups(&mut tx, id, &listing.groups).await?;
    tx.commit().await?;

    Ok(())
}

pub async fn delete_course(db: &SqlitePool, id: i64) -> Result<(), sqlx::Error> {
    let affected = sqlx::query("DELETE FROM courses WHERE id = ?1")
        .bind(id)
        .execute(db)
        .await?
        .rows_affected();

    if affected == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

pub async fn find_semester(db: &SqlitePool, slug: &str) -> Result<Option<Semester>, sqlx::Error> {
    sqlx::query_as::<_, Semester>(
        "SELECT id, slug, descr, subject_list, updated_at FROM semesters WHERE slug = ?1",
    )
    .bind(slug)
    .fetch_optional(db)
    .await
}

/// Inserts a semester unless one with the same slug exists; never
/// overwrites an existing row.
pub async fn insert_semester(
    db: &SqlitePool,
    semester: &NewSemester,
) -> Result<Semester, sqlx::Error> {
    sqlx::query("INSERT INTO semesters (slug, descr) VALUES (?1, ?2) ON CONFLICT(slug) DO NOTHING")
        .bind(&semester.slug)
        .bind(&semester.descr)
        .execute(db)
        .await?;

    find_semester(db, &semester.slug)
        .await?
        .ok_or(sqlx::Error::RowNotFound)
}

pub async fn update_semester_subjects(
    db: &SqlitePool,
    slug: &str,
    subject_list: &str,
) -> Result<Semester, sqlx::Error> {
    let now = Utc::now().to_rfc3339();

    sqlx::query_as::<_, Semester>(
        r#"
        UPDATE semesters
        SET subject_list = ?1,
            updated_at = ?2
        WHERE slug = ?3
        RETURNING id, slug, descr, subject_list, updated_at
        "#,
    )
    .bind(subject_list)
    .bind(now)
    .bind(slug)
    .fetch_optional(db)
    .await?
    .ok_or(sqlx::Error::RowNotFound)
}

async fn insert_groups(
    tx: &mut Transaction<'_, Sqlite>,
    course_id: i64,
    groups: &[SectionGroup],
) -> Result<(), sqlx::Error> {
    for (group_pos, group) in groups.iter().enumerate() {
        let components = serde_json::to_string(&group.components_required)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let group_id = sqlx::query(
            r#"
            INSERT INTO section_groups
                (course_id, position, units_min, units_max, components_required)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(course_id)
        .bind(group_pos as i64)
        .bind(group.units_min)
        .bind(group.units_max)
        .bind(components)
        .execute(&mut **tx)
        .await?
        .last_insert_rowid();

        for (section_pos, section) in group.sections.iter().enumerate() {
            let section_id = sqlx::query(
                r#"
                INSERT INTO sections
                    (group_id, position, class_nbr, section, component, campus, location)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(group_id)
            .bind(section_pos as i64)
            .bind(section.class_nbr)
            .bind(&section.section)
            .bind(&section.component)
            .bind(&section.campus)
            .bind(&section.location)
            .execute(&mut **tx)
            .await?
            .last_insert_rowid();

            for (meeting_pos, meeting) in section.meetings.iter().enumerate() {
                let meeting_id = sqlx::query(
                    r#"
                    INSERT INTO meetings
                        (section_id, position, pattern, time_start, time_end,
                        start_date, end_date, facility)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .bind(section_id)
                .bind(meeting_pos as i64)
                .bind(&meeting.pattern)
                .bind(&meeting.time_start)
                .bind(&meeting.time_end)
                .bind(&meeting.start_date)
                .bind(&meeting.end_date)
                .bind(&meeting.facility)
                .execute(&mut **tx)
                .await?
                .last_insert_rowid();

                for (professor_pos, professor) in meeting.professors.iter().enumerate() {
                    let professor_id: i64 = sqlx::query_scalar(
                        r#"
                        INSERT INTO professors (netid, first_name, last_name)
                        VALUES (?1, ?2, ?3)
                        ON CONFLICT(netid) DO UPDATE SET
                            first_name = excluded.first_name,
                            last_name = excluded.last_name
                        RETURNING id
                        "#,
                    )
                    .bind(&professor.netid)
                    .bind(&professor.first_name)
                    .bind(&professor.last_name)
                    .fetch_one(&mut **tx)
                    .await?;

                    sqlx::query(
                        r#"
                        INSERT OR IGNORE INTO meeting_professors
                            (meeting_id, professor_id, position, first_name, last_name)
                        VALUES (?1, ?2, ?3, ?4, ?5)
                        "#,
                    )
                    .bind(meeting_id)
                    .bind(professor_id)
                    .bind(professor_pos as i64)
                    .bind(&professor.first_name)
                    .bind(&professor.last_name)
                    .execute(&mut **tx)
                    .await?;
                }
            }
        }
    }

    Ok(())
}

async fn attach_groups(db: &SqlitePool, courses: &mut [Course]) -> Result<(), sqlx::Error> {
    if courses.is_empty() {
        return Ok(());
    }

    let course_ids: Vec<i64> = courses.iter().map(|c| c.id).collect();
    let mut groups = load_groups(db, &course_ids).await?;

    for course in courses.iter_mut() {
        course.groups = groups.remove(&course.id).unwrap_or_default();
    }
    Ok(())
}

/// Loads the section tree of each course, keyed by course id, preserving
/// the stored position order at every level.
async fn load_groups(
    db: &SqlitePool,
    course_ids: &[i64],
) -> Result<HashMap<i64, Vec<SectionGroup>>, sqlx::Error> {
    let group_rows: Vec<GroupRow> = fetch_in(
        db,
        "SELECT id, course_id, units_min, units_max, components_required FROM section_groups WHERE course_id",
        course_ids,
        " ORDER BY course_id, position",
    )
    .await?;

    let group_ids: Vec<i64> = group_rows.iter().map(|r| r.id).collect();
    let section_rows: Vec<SectionRow> = fetch_in(
        db,
        "SELECT id, group_id, class_nbr, section, component, campus, location FROM sections WHERE group_id",
        &group_ids,
        " ORDER BY group_id, position",
    )
    .await?;

    let section_ids: Vec<i64> = section_rows.iter().map(|r| r.id).collect();
    let meeting_rows: Vec<MeetingRow> = fetch_in(
        db,
        "SELECT id, section_id, pattern, time_start, time_end, start_date, end_date, facility FROM meetings WHERE section_id",
        &section_ids,
        " ORDER BY section_id, position",
    )
    .await?;

    let meeting_ids: Vec<i64> = meeting_rows.iter().map(|r| r.id).collect();
    let professor_rows: Vec<MeetingProfessorRow> = fetch_in(
        db,
        "SELECT mp.meeting_id, p.netid, mp.first_name, mp.last_name \
         FROM meeting_professors mp JOIN professors p ON p.id = mp.professor_id \
         WHERE mp.meeting_id",
        &meeting_ids,
        " ORDER BY mp.meeting_id, mp.position",
    )
    .await?;

    let mut professors: HashMap<i64, Vec<Professor>> = HashMap::new();
    for row in professor_rows {
        professors.entry(row.meeting_id).or_default().push(Professor {
            netid: row.netid,
            first_name: row.first_name,
            last_name: row.last_name,
        });
    }

    let mut meetings: HashMap<i64, Vec<Meeting>> = HashMap::new();
    for row in meeting_rows {
        meetings.entry(row.section_id).or_default().push(Meeting {
            pattern: row.pattern,
            time_start: row.time_start,
            time_end: row.time_end,
            start_date: row.start_date,
            end_date: row.end_date,
            facility: row.facility,
            professors: professors.remove(&row.id).unwrap_or_default(),
        });
    }

    let mut sections: HashMap<i64, Vec<Section>> = HashMap::new();
    for row in section_rows {
        sections.entry(row.group_id).or_default().push(Section {
            class_nbr: row.class_nbr,
            section: row.section,
            component: row.component,
            campus: row.campus,
            location: row.location,
            meetings: meetings.remove(&row.id).unwrap_or_default(),
        });
    }

    let mut groups: HashMap<i64, Vec<SectionGroup>> = HashMap::new();
    for row in group_rows {
        let components_required: Vec<String> = serde_json::from_str(&row.components_required)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        groups.entry(row.course_id).or_default().push(SectionGroup {
            units_min: row.units_min,
            units_max: row.units_max,
            components_required,
            sections: sections.remove(&row.id).unwrap_or_default(),
        });
    }

    Ok(groups)
}

/// Runs `{select} IN (...){order}` over `ids` in chunks.
async fn fetch_in<T>(
    db: &SqlitePool,
    select: &str,
    ids: &[i64],
    order: &str,
) -> Result<Vec<T>, sqlx::Error>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut rows = Vec::with_capacity(ids.len());

    for chunk in ids.chunks(IN_CHUNK) {
        let mut qb = QueryBuilder::<Sqlite>::new(select);
        qb.push(" IN (");
        let mut separated = qb.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        qb.push(order);

        rows.extend(qb.build_query_as::<T>().fetch_all(db).await?);
    }

    Ok(rows)
}
