//! Per-child choice forms: assembly from stored data and validation of a
//! submission. Both are pure; nothing here touches the database.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use meals_db::models::{Child, Meal, MealChoice, RegistrationWithMeals};

use crate::outcome::FieldError;

pub const REQUIRED: &str = "Please choose a meal.";
pub const NOT_OFFERED: &str = "That meal is not offered on this date.";

/// One child's editable choice for a single registration date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceForm {
    pub child: Child,
    /// Form field carrying this child's selection.
    pub field: String,
    /// Exactly the meals offered on the date.
    pub options: Vec<Meal>,
    /// The stored choice, if any.
    pub selected: Option<Uuid>,
    /// Raw value echoed back after a failed submission.
    pub submitted: Option<String>,
    pub error: Option<String>,
}

/// A validated (child, meal) pair ready to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidChoice {
    pub child_id: Uuid,
    pub meal_id: Uuid,
}

/// Name of the form field holding `child_id`'s meal.
pub fn field_name(child_id: Uuid) -> String {
    format!("{child_id}-meal")
}

/// Build one form per child for `registration`. No registration, no forms.
pub fn assemble(
    registration: Option<&RegistrationWithMeals>,
    children: &[Child],
    existing: &[MealChoice],
) -> Vec<ChoiceForm> {
    let Some(registration) = registration else {
        return Vec::new();
    };
    let registration_id = registration.registration.id;

    children
        .iter()
        .map(|child| ChoiceForm {
            child: child.clone(),
            field: field_name(child.id),
            options: registration.meals.clone(),
            selected: existing
                .iter()
                .find(|c| c.child_id == child.id && c.meal_registration_id == registration_id)
                .map(|c| c.meal_id),
            submitted: None,
            error: None,
        })
        .collect()
}

/// Check one submitted meal value against the offered meals.
pub fn validate_meal_value(value: Option<&str>, options: &[Meal]) -> Result<Uuid, &'static str> {
    let value = value.map(str::trim).filter(|v| !v.is_empty()).ok_or(REQUIRED)?;
    let meal_id = Uuid::parse_str(value).map_err(|_| NOT_OFFERED)?;
    if options.iter().any(|m| m.id == meal_id) {
        Ok(meal_id)
    } else {
        Err(NOT_OFFERED)
    }
}

/// Validate every form against `submitted`. Either all pass, or the errors
/// of every failing field are returned.
///
/// Fields that do not belong to one of `forms` are ignored.
pub fn validate_submission(
    forms: &[ChoiceForm],
    submitted: &HashMap<String, String>,
) -> Result<Vec<ValidChoice>, Vec<FieldError>> {
    let mut valid = Vec::with_capacity(forms.len());
    let mut errors = Vec::new();

    for form in forms {
        let value = submitted.get(&form.field).map(String::as_str);
        match validate_meal_value(value, &form.options) {
            Ok(meal_id) => valid.push(ValidChoice {
                child_id: form.child.id,
                meal_id,
            }),
            Err(message) => errors.push(FieldError::new(&form.field, message)),
        }
    }

    if errors.is_empty() { Ok(valid) } else { Err(errors) }
}

/// Attach submitted values and field errors to the forms for redisplay.
/// Valid children's input is kept so nothing the parent typed is lost.
pub fn redisplay(
    forms: Vec<ChoiceForm>,
    submitted: &HashMap<String, String>,
    errors: &[FieldError],
) -> Vec<ChoiceForm> {
    forms
        .into_iter()
        .map(|mut form| {
            form.submitted = submitted.get(&form.field).cloned();
            form.error = errors
                .iter()
                .find(|e| e.field == form.field)
                .map(|e| e.message.clone());
            form
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use meals_db::models::MealRegistration;

    use super::*;

    fn meal(name: &str) -> Meal {
        Meal {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            description: String::new(),
        }
    }

    fn child(name: &str, year_group: i32) -> Child {
        Child {
            id: Uuid::new_v4(),
            parent_id: Uuid::nil(),
            first_name: name.to_owned(),
            last_name: String::new(),
            year_group,
            class_name: None,
            created_at: Utc::now(),
        }
    }

    fn registration(meals: Vec<Meal>) -> RegistrationWithMeals {
        RegistrationWithMeals {
            registration: MealRegistration {
                id: Uuid::new_v4(),
                date: NaiveDate::from_ymd_opt(2026, 6, 10).unwrap(),
            },
            meals,
        }
    }

    fn choice(child: &Child, reg: &RegistrationWithMeals, meal: &Meal) -> MealChoice {
        MealChoice {
            id: Uuid::new_v4(),
            child_id: child.id,
            meal_registration_id: reg.registration.id,
            meal_id: meal.id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn no_registration_yields_no_forms() {
        assert!(assemble(None, &[child("Alice", 3)], &[]).is_empty());
    }

    #[test]
    fn forms_offer_only_registration_meals_and_prefill() {
        let (a, b) = (meal("Meal A"), meal("Meal B"));
        let reg = registration(vec![a.clone(), b.clone()]);
        let (c1, c2) = (child("Alice", 3), child("Bob", 4));
        let existing = vec![choice(&c2, &reg, &b)];

        let forms = assemble(Some(&reg), &[c1.clone(), c2.clone()], &existing);

        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0].field, format!("{}-meal", c1.id));
        assert_eq!(forms[0].options, vec![a, b.clone()]);
        assert_eq!(forms[0].selected, None);
        assert_eq!(forms[1].selected, Some(b.id));
    }

    #[test]
    fn choices_for_other_registrations_are_not_prefilled() {
        let a = meal("Meal A");
        let reg = registration(vec![a.clone()]);
        let other = registration(vec![a.clone()]);
        let c1 = child("Alice", 3);
        let forms = assemble(Some(&reg), &[c1.clone()], &[choice(&c1, &other, &a)]);
        assert_eq!(forms[0].selected, None);
    }

    #[test]
    fn all_valid_submission_passes() {
        let (a, b) = (meal("Meal A"), meal("Meal B"));
        let reg = registration(vec![a.clone(), b.clone()]);
        let (c1, c2) = (child("Alice", 3), child("Bob", 4));
        let forms = assemble(Some(&reg), &[c1.clone(), c2.clone()], &[]);

        let submitted = HashMap::from([
            (field_name(c1.id), a.id.to_string()),
            (field_name(c2.id), b.id.to_string()),
        ]);
        let valid = validate_submission(&forms, &submitted).unwrap();
        assert_eq!(
            valid,
            vec![
                ValidChoice { child_id: c1.id, meal_id: a.id },
                ValidChoice { child_id: c2.id, meal_id: b.id },
            ]
        );
    }

    #[test]
    fn one_bad_field_fails_the_whole_submission() {
        let (a, b) = (meal("Meal A"), meal("Meal B"));
        let reg = registration(vec![a.clone(), b]);
        let (c1, c2) = (child("Alice", 3), child("Bob", 4));
        let forms = assemble(Some(&reg), &[c1.clone(), c2.clone()], &[]);

        let submitted = HashMap::from([
            (field_name(c1.id), a.id.to_string()),
            (field_name(c2.id), "not-a-meal".to_owned()),
        ]);
        let errors = validate_submission(&forms, &submitted).unwrap_err();
        assert_eq!(errors, vec![FieldError::new(field_name(c2.id), NOT_OFFERED)]);
    }

    #[test]
    fn meal_from_catalogue_but_not_offered_is_rejected() {
        let a = meal("Meal A");
        let elsewhere = meal("Only on Fridays");
        assert_eq!(
            validate_meal_value(Some(&elsewhere.id.to_string()), &[a]),
            Err(NOT_OFFERED)
        );
    }

    #[test]
    fn missing_and_blank_values_are_required() {
        let a = meal("Meal A");
        assert_eq!(validate_meal_value(None, &[a.clone()]), Err(REQUIRED));
        assert_eq!(validate_meal_value(Some("  "), &[a]), Err(REQUIRED));
    }

    #[test]
    fn fields_for_unknown_children_are_ignored() {
        let a = meal("Meal A");
        let reg = registration(vec![a.clone()]);
        let c1 = child("Alice", 3);
        let forms = assemble(Some(&reg), &[c1.clone()], &[]);
        let submitted = HashMap::from([
            (field_name(c1.id), a.id.to_string()),
            (field_name(Uuid::new_v4()), a.id.to_string()),
        ]);
        assert_eq!(validate_submission(&forms, &submitted).unwrap().len(), 1);
    }

    #[test]
    fn redisplay_keeps_valid_input_and_marks_only_failing_field() {
        let a = meal("Meal A");
        let reg = registration(vec![a.clone()]);
        let (c1, c2) = (child("Alice", 3), child("Bob", 4));
        let forms = assemble(Some(&reg), &[c1.clone(), c2.clone()], &[]);
        let submitted = HashMap::from([
            (field_name(c1.id), a.id.to_string()),
            (field_name(c2.id), "bogus".to_owned()),
        ]);
        let errors = validate_submission(&forms, &submitted).unwrap_err();

        let shown = redisplay(forms, &submitted, &errors);
        assert_eq!(shown[0].submitted.as_deref(), Some(a.id.to_string().as_str()));
        assert_eq!(shown[0].error, None);
        assert_eq!(shown[1].submitted.as_deref(), Some("bogus"));
        assert_eq!(shown[1].error.as_deref(), Some(NOT_OFFERED));
    }
}
